//! Per-node protocol counters
//!
//! Lock-free counters bumped on the election, heartbeat and replication
//! paths and exported as a serializable snapshot in the node status.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for tracking event counts
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct NodeMetrics {
    pub elections_started: Counter,
    pub elections_won: Counter,
    pub heartbeats_sent: Counter,
    pub heartbeats_received: Counter,
    pub leader_timeouts: Counter,
    pub operations_admitted: Counter,
    pub operations_applied: Counter,
    pub stale_discarded: Counter,
    pub unreachable_sends: Counter,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            elections_started: self.elections_started.get(),
            elections_won: self.elections_won.get(),
            heartbeats_sent: self.heartbeats_sent.get(),
            heartbeats_received: self.heartbeats_received.get(),
            leader_timeouts: self.leader_timeouts.get(),
            operations_admitted: self.operations_admitted.get(),
            operations_applied: self.operations_applied.get(),
            stale_discarded: self.stale_discarded.get(),
            unreachable_sends: self.unreachable_sends.get(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub elections_started: u64,
    pub elections_won: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
    pub leader_timeouts: u64,
    pub operations_admitted: u64,
    pub operations_applied: u64,
    pub stale_discarded: u64,
    pub unreachable_sends: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_snapshot() {
        let metrics = NodeMetrics::new();
        metrics.elections_started.inc();
        metrics.stale_discarded.add(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.elections_started, 1);
        assert_eq!(snapshot.stale_discarded, 2);
        assert_eq!(snapshot.elections_won, 0);
    }
}
