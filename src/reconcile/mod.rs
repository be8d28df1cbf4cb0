//! Reconciliation of stored tenant records against provider-reported truth.
//!
//! `apply` holds the one pure status-transition function every write path
//! goes through (batch pass, webhook, wizard confirm); `job` drives the
//! scheduled and on-demand batch passes.

pub mod apply;
pub mod job;

pub use apply::StatusPatch;
pub use job::{ReconcileError, ReconcileJob, ReconcileSummary, RunTrigger};
