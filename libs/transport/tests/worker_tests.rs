//! Device worker threads end to end

use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use transport::{
    DeviceWorkers, Endpoint, IoContext, MessageQueue, Requestor, RoutingTag, Transport,
    TransportError,
};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEADLINE: Duration = Duration::from_secs(5);

#[test]
fn test_sender_and_receiver_pump_queues() {
    let ctx = IoContext::with_defaults().unwrap();
    let tag = RoutingTag::for_identity("LASERrobot1front_scan");

    let tx_transport = Arc::new(Transport::new(ctx.clone()));
    let publisher = tx_transport.initialize_publisher(0, tag).unwrap();
    let rx_transport = Arc::new(Transport::new(ctx.clone()));
    rx_transport
        .connect_subscriber(LOCALHOST, publisher.port(), tag)
        .unwrap();
    assert!(publisher.wait_for_peers(1, DEADLINE));

    let tx_queue = Arc::new(MessageQueue::with_timeout(30, Duration::from_millis(50)));
    let rx_queue = Arc::new(MessageQueue::with_timeout(30, Duration::from_millis(50)));

    let mut tx_workers = DeviceWorkers::new("laser", tx_transport.clone());
    tx_workers.spawn_sender(tx_queue.clone()).unwrap();
    let mut rx_workers = DeviceWorkers::new("viewer", rx_transport.clone());
    rx_workers.spawn_receiver(rx_queue.clone()).unwrap();
    assert_eq!(tx_workers.len(), 1);

    let deadline = Instant::now() + DEADLINE;
    let received = loop {
        tx_queue.push(Bytes::from_static(b"scan"));
        if let Some(payload) = rx_queue.pop() {
            break payload;
        }
        assert!(Instant::now() < deadline, "no frame crossed the link");
    };
    assert_eq!(received.as_ref(), b"scan");

    rx_workers.stop();
    tx_workers.stop();
    assert!(!tx_workers.is_running());
    assert!(tx_workers.is_empty());
    assert!(publisher.is_closed());
    assert!(publisher.stats().snapshot().frames_sent > 0);
}

#[test]
fn test_service_worker_answers_and_stops() {
    let ctx = IoContext::with_defaults().unwrap();
    let transport = Arc::new(Transport::with_tag_width(ctx.clone(), 0).unwrap());
    let responsor = transport
        .initialize_responsor(0, RoutingTag::untagged())
        .unwrap();
    let port = responsor.port();
    drop(responsor);

    let served = Arc::new(AtomicUsize::new(0));
    let mut workers = DeviceWorkers::new("echo", transport.clone());
    {
        let served = served.clone();
        workers
            .spawn_service(move |request| {
                served.fetch_add(1, Ordering::Relaxed);
                request.to_ascii_uppercase()
            })
            .unwrap();
    }

    let client = Requestor::open(&ctx, Endpoint::connect(LOCALHOST, port), RoutingTag::untagged()).unwrap();
    assert!(client.wait_for_peers(1, DEADLINE));

    for word in [&b"ping"[..], &b"pong"[..]] {
        assert!(client.send_request(word).unwrap());
        let reply = client.receive_response_timeout(DEADLINE, false).unwrap();
        assert_eq!(reply.unwrap().to_vec(), word.to_ascii_uppercase());
    }

    let started = Instant::now();
    workers.stop();
    assert_eq!(served.load(Ordering::Relaxed), 2);
    // The service thread notices the closed socket well within one receive timeout
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_spawning_without_role_is_rejected() {
    let ctx = IoContext::with_defaults().unwrap();
    let transport = Arc::new(Transport::new(ctx));
    let mut workers = DeviceWorkers::new("empty", transport);

    let queue = Arc::new(MessageQueue::new(4));
    assert!(matches!(
        workers.spawn_sender(queue.clone()),
        Err(TransportError::NotInitialized { role: "Publisher" })
    ));
    assert!(matches!(
        workers.spawn_receiver(queue),
        Err(TransportError::NotInitialized { role: "Subscriber" })
    ));
    assert!(workers.spawn_service(|request| request.to_vec()).is_err());
    assert!(workers.is_empty());
}

#[test]
fn test_generic_worker_observes_stop() {
    let ctx = IoContext::with_defaults().unwrap();
    let mut workers = DeviceWorkers::new("tick", Arc::new(Transport::new(ctx)));
    let ticks = Arc::new(AtomicUsize::new(0));

    {
        let ticks = ticks.clone();
        workers
            .spawn("loop", move |token| {
                while token.is_running() {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap();
    }

    std::thread::sleep(Duration::from_millis(20));
    workers.stop();
    let after_stop = ticks.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(20));
    assert!(after_stop > 0);
    assert_eq!(ticks.load(Ordering::Relaxed), after_stop);
}
