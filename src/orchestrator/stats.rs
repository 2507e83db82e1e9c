//! Aggregate relay counters
//!
//! Written by the orchestrator, read by the stats timer and the HTTP
//! surface. Every accessor is a relaxed atomic load.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct RelayStats {
    started_at: DateTime<Utc>,
    messages_received: AtomicU64,
    messages_processed: AtomicU64,
    messages_failed: AtomicU64,
    duplicates_dropped: AtomicU64,
    already_processed: AtomicU64,
    trusted_submissions: AtomicU64,
    proof_submissions: AtomicU64,
    requeued: AtomicU64,
    tx_submitted: AtomicU64,
    tx_confirmed: AtomicU64,
    tx_failed: AtomicU64,
    queue_depth: AtomicUsize,
}

/// Serializable copy of the counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_failed: u64,
    pub duplicates_dropped: u64,
    pub already_processed: u64,
    pub trusted_submissions: u64,
    pub proof_submissions: u64,
    pub requeued: u64,
    pub tx_submitted: u64,
    pub tx_confirmed: u64,
    pub tx_failed: u64,
    pub queue_depth: usize,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! counter {
    ($get:ident, $inc:ident) => {
        pub fn $get(&self) -> u64 {
            self.$get.load(Ordering::Relaxed)
        }

        pub(crate) fn $inc(&self) {
            self.$get.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            messages_received: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            already_processed: AtomicU64::new(0),
            trusted_submissions: AtomicU64::new(0),
            proof_submissions: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            tx_submitted: AtomicU64::new(0),
            tx_confirmed: AtomicU64::new(0),
            tx_failed: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
        }
    }

    counter!(messages_received, inc_messages_received);
    counter!(messages_processed, inc_messages_processed);
    counter!(messages_failed, inc_messages_failed);
    counter!(duplicates_dropped, inc_duplicates_dropped);
    counter!(already_processed, inc_already_processed);
    counter!(trusted_submissions, inc_trusted_submissions);
    counter!(proof_submissions, inc_proof_submissions);
    counter!(requeued, inc_requeued);
    counter!(tx_submitted, inc_tx_submitted);
    counter!(tx_confirmed, inc_tx_confirmed);
    counter!(tx_failed, inc_tx_failed);

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub(crate) fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            messages_received: self.messages_received(),
            messages_processed: self.messages_processed(),
            messages_failed: self.messages_failed(),
            duplicates_dropped: self.duplicates_dropped(),
            already_processed: self.already_processed(),
            trusted_submissions: self.trusted_submissions(),
            proof_submissions: self.proof_submissions(),
            requeued: self.requeued(),
            tx_submitted: self.tx_submitted(),
            tx_confirmed: self.tx_confirmed(),
            tx_failed: self.tx_failed(),
            queue_depth: self.queue_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = RelayStats::new();
        stats.inc_messages_received();
        stats.inc_messages_received();
        stats.inc_tx_submitted();
        stats.set_queue_depth(4);

        assert_eq!(stats.messages_received(), 2);
        assert_eq!(stats.tx_submitted(), 1);
        assert_eq!(stats.messages_failed(), 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.queue_depth, 4);
        assert!(snapshot.uptime_secs >= 0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["tx_submitted"], 1);
    }
}
