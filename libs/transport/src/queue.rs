//! Bounded device message queue
//!
//! Decouples a device's simulation-side producer from its network-side
//! consumer. When full, a push evicts the oldest half of the queue before
//! appending: for periodic sensor streams a fresh sample is worth more than a
//! stale backlog. Both ends wait a bounded time and then give up quietly.

use bridge_config::QueueSettings;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

pub const DEFAULT_CAPACITY: usize = 30;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
    timeout: Duration,
    evicted: AtomicU64,
}

impl<T> MessageQueue<T> {
    /// Queue with the default 500 ms push/pop wait. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self::with_timeout(capacity, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
            timeout,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self::with_timeout(settings.capacity, settings.timeout())
    }

    /// Append `item`, evicting the oldest half first when the queue is full.
    ///
    /// Returns `false` if the queue lock could not be taken within the
    /// timeout; the item is dropped.
    pub fn push(&self, item: T) -> bool {
        let Some(mut items) = self.items.try_lock_for(self.timeout) else {
            return false;
        };

        if items.len() >= self.capacity {
            let keep = self.capacity / 2;
            let evict = items.len() - keep;
            items.drain(..evict);
            self.evicted.fetch_add(evict as u64, Ordering::Relaxed);
            trace!(evict, capacity = self.capacity, "Queue full, dropped oldest half");
        }

        items.push_back(item);
        drop(items);
        self.available.notify_one();
        true
    }

    /// Oldest item, waiting up to the queue timeout for one to arrive
    pub fn pop(&self) -> Option<T> {
        self.pop_timeout(self.timeout)
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.try_lock_until(deadline)?;

        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Oldest item if one is ready right now
    pub fn try_pop(&self) -> Option<T> {
        self.items.try_lock()?.pop_front()
    }

    /// Drop everything queued; returns how many items were discarded
    pub fn flush(&self) -> usize {
        let mut items = self.items.lock();
        let flushed = items.len();
        items.clear();
        flushed
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Items dropped by the overflow policy since creation
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("evicted", &self.evicted())
            .finish()
    }
}
