//! Socket statistics
//!
//! Lock-free counters shared between a socket's blocking API and its
//! background connection tasks, plus a sampled latency tracker for the time a
//! publish takes to hand a frame to the transport.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for one socket role
#[derive(Clone)]
pub struct TransportStats {
    frames_sent: Arc<AtomicU64>,
    bytes_sent: Arc<AtomicU64>,
    send_failures: Arc<AtomicU64>,
    frames_received: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    frames_filtered: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,
    peers_connected: Arc<AtomicU64>,
    peers_disconnected: Arc<AtomicU64>,

    latency_tracker: Arc<RwLock<LatencyTracker>>,
    last_activity: Arc<RwLock<Option<Instant>>>,
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    /// Frames discarded by the subscriber's tag-prefix filter
    pub frames_filtered: u64,
    /// Frames discarded because the receive high-water mark was reached
    pub frames_dropped: u64,
    pub peers_connected: u64,
    pub peers_disconnected: u64,
    pub last_transport_ns: u64,
    pub avg_transport_ns: u64,
    pub p99_transport_ns: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self {
            frames_sent: Arc::new(AtomicU64::new(0)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            send_failures: Arc::new(AtomicU64::new(0)),
            frames_received: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            frames_filtered: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            peers_connected: Arc::new(AtomicU64::new(0)),
            peers_disconnected: Arc::new(AtomicU64::new(0)),
            latency_tracker: Arc::new(RwLock::new(LatencyTracker::new())),
            last_activity: Arc::new(RwLock::new(None)),
        }
    }

    #[inline]
    pub(crate) fn record_send(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_receive(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub(crate) fn record_filtered(&self) {
        self.frames_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_peer_connected(&self) {
        self.peers_connected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_peer_disconnected(&self) {
        self.peers_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one publish took to reach the transport
    pub fn record_transport_time(&self, elapsed: Duration) {
        // Skip the sample rather than contend with a snapshot reader
        if let Some(mut tracker) = self.latency_tracker.try_write() {
            tracker.record(elapsed.as_nanos() as u64);
        }
    }

    pub fn last_activity(&self) -> Option<Instant> {
        *self.last_activity.read()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let latency = self.latency_tracker.read();
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            peers_connected: self.peers_connected.load(Ordering::Relaxed),
            peers_disconnected: self.peers_disconnected.load(Ordering::Relaxed),
            last_transport_ns: latency.last(),
            avg_transport_ns: latency.average(),
            p99_transport_ns: latency.percentile(99),
        }
    }

    fn touch(&self) {
        if let Some(mut last) = self.last_activity.try_write() {
            *last = Some(Instant::now());
        }
    }
}

impl Default for TransportStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}

/// Ring buffer of recent samples for percentile queries
struct LatencyTracker {
    samples: Vec<u64>,
    position: usize,
    total_samples: u64,
    sum: u64,
    last: u64,
}

impl LatencyTracker {
    const SAMPLE_SIZE: usize = 1000;

    fn new() -> Self {
        Self {
            samples: Vec::with_capacity(Self::SAMPLE_SIZE),
            position: 0,
            total_samples: 0,
            sum: 0,
            last: 0,
        }
    }

    fn record(&mut self, latency_ns: u64) {
        self.last = latency_ns;
        self.sum = self.sum.saturating_add(latency_ns);
        self.total_samples += 1;

        if self.samples.len() < Self::SAMPLE_SIZE {
            self.samples.push(latency_ns);
        } else {
            self.samples[self.position] = latency_ns;
            self.position = (self.position + 1) % Self::SAMPLE_SIZE;
        }
    }

    fn last(&self) -> u64 {
        self.last
    }

    fn average(&self) -> u64 {
        if self.total_samples > 0 {
            self.sum / self.total_samples
        } else {
            0
        }
    }

    fn percentile(&self, p: usize) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() - 1) * p) / 100;
        sorted[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_shared_between_clones() {
        let stats = TransportStats::new();
        let clone = stats.clone();

        clone.record_send(10);
        clone.record_send(5);
        stats.record_send_failure();
        stats.record_dropped();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.send_failures, 1);
        assert_eq!(snapshot.frames_dropped, 1);
        assert!(stats.last_activity().is_some());
    }

    #[test]
    fn test_transport_time_percentiles() {
        let stats = TransportStats::new();
        for micros in 1..=100u64 {
            stats.record_transport_time(Duration::from_micros(micros));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_transport_ns, 100_000);
        assert_eq!(snapshot.avg_transport_ns, 50_500);
        assert_eq!(snapshot.p99_transport_ns, 99_000);
    }
}
