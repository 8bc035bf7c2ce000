//! The collaborators every partition worker shares.
//!
//! Built once at process start from ready-to-use clients and handed to the
//! ingestion loop. Cloning is cheap (all `Arc`s).

use std::sync::Arc;

use bridge_db::DocumentStore;
use bridge_reconcile::{FindClient, Reconciler};

use crate::stats::BridgeStats;

#[derive(Clone)]
pub struct BridgeContext {
    pub store: Arc<dyn DocumentStore>,
    pub reconciler: Reconciler,
    pub stats: Arc<BridgeStats>,
}

impl BridgeContext {
    /// `max_in_flight == 0` leaves reconciliation fan-out unbounded.
    pub fn new(store: Arc<dyn DocumentStore>, finder: Arc<dyn FindClient>, max_in_flight: usize) -> Self {
        let reconciler = Reconciler::new(finder, Arc::clone(&store), max_in_flight);
        Self {
            store,
            reconciler,
            stats: Arc::new(BridgeStats::new()),
        }
    }
}
