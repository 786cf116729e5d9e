//! Replication counters
//!
//! - Counters only, monotonic
//! - One registry per replicable, shared with its sending queue
//! - Relaxed atomics; exactness across threads is not required

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-replicable counters
#[derive(Debug, Default)]
pub struct ReplicationMetrics {
    applied: AtomicU64,
    apply_failures: AtomicU64,
    fanned_out: AtomicU64,
    forwarded: AtomicU64,
    forward_failures: AtomicU64,
    retries: AtomicU64,
    echoes_suppressed: AtomicU64,
    dropped_by_transform: AtomicU64,
    listener_failures: AtomicU64,
    initial_loads: AtomicU64,
}

impl ReplicationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_apply_failures(&self) {
        self.apply_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fanned_out(&self) {
        self.fanned_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_forward_failures(&self) {
        self.forward_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_echoes_suppressed(&self) {
        self.echoes_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped_by_transform(&self) {
        self.dropped_by_transform.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listener_failures(&self) {
        self.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_initial_loads(&self) {
        self.initial_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            apply_failures: self.apply_failures.load(Ordering::Relaxed),
            fanned_out: self.fanned_out.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            forward_failures: self.forward_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            echoes_suppressed: self.echoes_suppressed.load(Ordering::Relaxed),
            dropped_by_transform: self.dropped_by_transform.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            initial_loads: self.initial_loads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ReplicationMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub applied: u64,
    pub apply_failures: u64,
    pub fanned_out: u64,
    pub forwarded: u64,
    pub forward_failures: u64,
    pub retries: u64,
    pub echoes_suppressed: u64,
    pub dropped_by_transform: u64,
    pub listener_failures: u64,
    pub initial_loads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(ReplicationMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_increment_independently() {
        let metrics = ReplicationMetrics::new();
        metrics.increment_applied();
        metrics.increment_applied();
        metrics.increment_forward_failures();
        metrics.increment_echoes_suppressed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.applied, 2);
        assert_eq!(snapshot.forward_failures, 1);
        assert_eq!(snapshot.echoes_suppressed, 1);
        assert_eq!(snapshot.forwarded, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = ReplicationMetrics::new();
        metrics.increment_dropped_by_transform();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["dropped_by_transform"], 1);
        assert_eq!(json["initial_loads"], 0);
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(ReplicationMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.increment_fanned_out();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().fanned_out, 800);
    }
}
