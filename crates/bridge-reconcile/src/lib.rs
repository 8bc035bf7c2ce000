//! bridge-reconcile
//!
//! Catch-up path for documents whose change history the upstream store could
//! not deliver. For each referenced document the upstream `find` endpoint is
//! queried and every returned document overwrites the local copy.
//!
//! This is not the primary data path; mutations are.

pub mod client;
pub mod reconciler;

pub use client::{FindClient, FindRequest, HttpFindClient, ReconcileError, UpstreamDocument, FIND_PATH, TXN_ID_HEADER};
pub use reconciler::{ReconcileBatch, Reconciler, ReferenceOutcome};
