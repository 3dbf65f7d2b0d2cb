//! Bounded queue properties

use proptest::prelude::*;
use std::time::Duration;
use transport::MessageQueue;

proptest! {
    #[test]
    fn prop_length_never_exceeds_capacity(
        capacity in 1usize..64,
        ops in prop::collection::vec(any::<bool>(), 0..400),
    ) {
        let queue = MessageQueue::with_timeout(capacity, Duration::from_millis(10));
        let mut next = 0u32;
        for push in ops {
            if push {
                prop_assert!(queue.push(next));
                next += 1;
            } else {
                queue.try_pop();
            }
            prop_assert!(queue.len() <= capacity);
        }
    }

    #[test]
    fn prop_pop_order_is_push_order_minus_evictions(
        capacity in 1usize..32,
        count in 0u32..200,
    ) {
        let queue = MessageQueue::with_timeout(capacity, Duration::from_millis(10));
        for i in 0..count {
            queue.push(i);
        }

        let drained: Vec<u32> = std::iter::from_fn(|| queue.try_pop()).collect();

        // Survivors are a strictly increasing run ending at the newest item
        prop_assert!(drained.windows(2).all(|w| w[0] < w[1]));
        if count > 0 {
            prop_assert_eq!(drained.last().copied(), Some(count - 1));
        }
        prop_assert_eq!(drained.len() as u64 + queue.evicted(), count as u64);
    }
}

#[test]
fn test_default_queue_matches_device_defaults() {
    let queue: MessageQueue<Vec<u8>> = MessageQueue::default();
    assert_eq!(queue.capacity(), 30);
    assert_eq!(queue.timeout(), Duration::from_millis(500));

    let settings = bridge_config::QueueSettings {
        capacity: 12,
        timeout_ms: 20,
    };
    let queue: MessageQueue<Vec<u8>> = MessageQueue::from_settings(&settings);
    assert_eq!(queue.capacity(), 12);
    assert_eq!(queue.timeout(), Duration::from_millis(20));
}
