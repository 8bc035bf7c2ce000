//! Process-wide counters.
//!
//! Shared by every partition worker and reconciliation monitor. Counters are
//! monotonic; readers take a [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct BridgeStats {
    started_at_utc: DateTime<Utc>,
    received: AtomicU64,
    empty_payloads: AtomicU64,
    decode_failures: AtomicU64,
    unrecognized_events: AtomicU64,
    mutations_applied: AtomicU64,
    store_failures: AtomicU64,
    reconcile_requests: AtomicU64,
    references_dispatched: AtomicU64,
    references_reconciled: AtomicU64,
    references_failed: AtomicU64,
    documents_reconciled: AtomicU64,
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            started_at_utc: Utc::now(),
            received: AtomicU64::new(0),
            empty_payloads: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            unrecognized_events: AtomicU64::new(0),
            mutations_applied: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            reconcile_requests: AtomicU64::new(0),
            references_dispatched: AtomicU64::new(0),
            references_reconciled: AtomicU64::new(0),
            references_failed: AtomicU64::new(0),
            documents_reconciled: AtomicU64::new(0),
        }
    }

    bump! {
        record_received => received,
        record_empty_payload => empty_payloads,
        record_decode_failure => decode_failures,
        record_unrecognized => unrecognized_events,
        record_mutation_applied => mutations_applied,
        record_store_failure => store_failures,
        record_reconcile_request => reconcile_requests,
        record_reference_reconciled => references_reconciled,
        record_reference_failed => references_failed,
    }

    pub fn record_references_dispatched(&self, n: u64) {
        self.references_dispatched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_documents_reconciled(&self, n: u64) {
        self.documents_reconciled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |a: &AtomicU64| a.load(Ordering::Relaxed);
        StatsSnapshot {
            started_at_utc: self.started_at_utc,
            received: get(&self.received),
            empty_payloads: get(&self.empty_payloads),
            decode_failures: get(&self.decode_failures),
            unrecognized_events: get(&self.unrecognized_events),
            mutations_applied: get(&self.mutations_applied),
            store_failures: get(&self.store_failures),
            reconcile_requests: get(&self.reconcile_requests),
            references_dispatched: get(&self.references_dispatched),
            references_reconciled: get(&self.references_reconciled),
            references_failed: get(&self.references_failed),
            documents_reconciled: get(&self.documents_reconciled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub started_at_utc: DateTime<Utc>,
    pub received: u64,
    pub empty_payloads: u64,
    pub decode_failures: u64,
    pub unrecognized_events: u64,
    pub mutations_applied: u64,
    pub store_failures: u64,
    pub reconcile_requests: u64,
    pub references_dispatched: u64,
    pub references_reconciled: u64,
    pub references_failed: u64,
    pub documents_reconciled: u64,
}

impl StatsSnapshot {
    /// References dispatched for reconciliation whose outcome is not yet
    /// recorded.
    pub fn pending_references(&self) -> u64 {
        self.references_dispatched
            .saturating_sub(self.references_reconciled + self.references_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_references_tracks_outstanding_work() {
        let stats = BridgeStats::new();
        stats.record_references_dispatched(3);
        stats.record_reference_reconciled();
        stats.record_reference_failed();
        assert_eq!(stats.snapshot().pending_references(), 1);

        stats.record_reference_reconciled();
        assert_eq!(stats.snapshot().pending_references(), 0);
    }
}
