//! # Reconciliation Job
//!
//! Background pass that aligns stored tenant records with the provider's
//! reported truth for all tenants at once: one bulk instance listing, one
//! record fetch, then an idempotent per-record upsert. Runs on a fixed
//! interval and on demand via the manual trigger endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::provider::{EvolutionClient, ProviderError};
use crate::reconcile::StatusPatch;
use crate::repositories::{SyncStatusRepository, TenantInstanceRepository};

/// Errors that abort a whole reconciliation pass.
///
/// Per-record upsert failures are NOT here: they are logged, counted in the
/// summary, and never abort the batch.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The bulk provider fetch failed; no partial state is written.
    #[error("provider fetch failed: {0}")]
    Provider(#[from] ProviderError),
    /// Reading the stored working set failed.
    #[error("record store unavailable: {0}")]
    Store(#[from] anyhow::Error),
}

/// Audit metadata describing what kicked off a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrigger {
    /// True for scheduled passes, false for operator-initiated ones.
    pub automatic: bool,
    /// Free-form origin tag, audit logging only.
    pub source: String,
}

impl Default for RunTrigger {
    fn default() -> Self {
        Self {
            automatic: true,
            source: "scheduler".to_string(),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReconcileSummary {
    /// Instances the provider reported.
    pub total_snapshots: u64,
    /// Snapshots that matched a stored record by instance name.
    pub matched: u64,
    /// Matched records successfully upserted.
    pub synced: u64,
    /// Matched records whose upsert failed (logged, batch continued).
    pub failed: u64,
    /// Snapshots owned by no tenant record.
    pub orphaned: u64,
}

impl ReconcileSummary {
    /// Human-diagnosable one-liner persisted alongside the payload.
    pub fn message(&self) -> String {
        format!(
            "synced {}/{} matched instances ({} reported, {} orphaned, {} failed)",
            self.synced, self.matched, self.total_snapshots, self.orphaned, self.failed
        )
    }
}

/// Reconciliation job over the provider client and the record store.
pub struct ReconcileJob {
    config: Arc<AppConfig>,
    provider: Arc<EvolutionClient>,
    records: TenantInstanceRepository,
    status: SyncStatusRepository,
}

impl ReconcileJob {
    /// Create a new job instance.
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<EvolutionClient>,
        records: TenantInstanceRepository,
        status: SyncStatusRepository,
    ) -> Self {
        Self {
            config,
            provider,
            records,
            status,
        }
    }

    /// Run the scheduled loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.reconciler.tick_interval_seconds,
            "Starting reconciliation loop"
        );
        let tick_interval =
            TokioDuration::from_secs(self.config.reconciler.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconciliation loop shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.run_once(RunTrigger::default()).await {
                        error!(error = %err, "Scheduled reconciliation pass failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("reconcile_pass_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Reconciliation loop stopped");
    }

    /// Execute one full pass and persist its outcome to the job-status
    /// store. Status-store write failures are logged but never mask the
    /// pass result.
    pub async fn run_once(&self, trigger: RunTrigger) -> Result<ReconcileSummary, ReconcileError> {
        info!(
            automatic = trigger.automatic,
            source = %trigger.source,
            "Reconciliation pass starting"
        );

        match self.execute().await {
            Ok(summary) => {
                let payload = serde_json::json!({
                    "summary": summary,
                    "trigger": trigger,
                });
                if let Err(err) = self
                    .status
                    .record_success(&summary.message(), payload, Utc::now())
                    .await
                {
                    warn!(error = %err, "Failed to persist reconciliation success entry");
                }

                info!(
                    synced = summary.synced,
                    failed = summary.failed,
                    orphaned = summary.orphaned,
                    total = summary.total_snapshots,
                    "Reconciliation pass completed"
                );
                Ok(summary)
            }
            Err(err) => {
                if let Err(status_err) = self
                    .status
                    .record_failure(&err.to_string(), Utc::now())
                    .await
                {
                    warn!(error = %status_err, "Failed to persist reconciliation error entry");
                }
                Err(err)
            }
        }
    }

    async fn execute(&self) -> Result<ReconcileSummary, ReconcileError> {
        // One bulk call for the whole pass; a failure here aborts before any
        // record is touched, so we never reconcile against a partial view.
        let snapshots = self.provider.list_instances().await?;

        let bound = self.records.find_bound().await?;
        gauge!("reconcile_bound_records").set(bound.len() as f64);

        let mut by_name: HashMap<String, _> = bound
            .into_iter()
            .filter_map(|record| {
                record
                    .instance_name
                    .clone()
                    .map(|name| (name, record))
            })
            .collect();

        let mut summary = ReconcileSummary {
            total_snapshots: snapshots.len() as u64,
            ..ReconcileSummary::default()
        };

        let now = Utc::now();
        for snapshot in &snapshots {
            let Some(record) = by_name.remove(&snapshot.instance_name) else {
                // Instances are always created through the wizard first, so
                // an unmatched snapshot is provider-side state no tenant
                // owns (yet, or anymore).
                summary.orphaned += 1;
                debug!(
                    instance_name = %snapshot.instance_name,
                    status = ?snapshot.status,
                    "Skipping orphaned provider instance"
                );
                continue;
            };

            summary.matched += 1;
            let patch = StatusPatch::from_snapshot(&record, snapshot, now);
            match self.records.apply_status(&record.user_id, &patch).await {
                Ok(_) => {
                    summary.synced += 1;
                    counter!("reconcile_records_synced_total").increment(1);
                }
                Err(err) => {
                    summary.failed += 1;
                    counter!("reconcile_records_failed_total").increment(1);
                    warn!(
                        instance_name = %snapshot.instance_name,
                        user_id = %record.user_id,
                        error = %err,
                        "Record upsert failed; continuing batch"
                    );
                }
            }
        }

        if summary.orphaned > 0 {
            counter!("reconcile_orphan_snapshots_total").increment(summary.orphaned);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_message_is_diagnosable() {
        let summary = ReconcileSummary {
            total_snapshots: 5,
            matched: 3,
            synced: 2,
            failed: 1,
            orphaned: 2,
        };

        assert_eq!(
            summary.message(),
            "synced 2/3 matched instances (5 reported, 2 orphaned, 1 failed)"
        );
    }

    #[test]
    fn default_trigger_is_scheduled() {
        let trigger = RunTrigger::default();
        assert!(trigger.automatic);
        assert_eq!(trigger.source, "scheduler");
    }

    #[test]
    fn summary_round_trips_through_json() {
        let summary = ReconcileSummary {
            total_snapshots: 2,
            matched: 2,
            synced: 2,
            failed: 0,
            orphaned: 0,
        };

        let value = serde_json::to_value(&summary).unwrap();
        let back: ReconcileSummary = serde_json::from_value(value).unwrap();
        assert_eq!(back, summary);
    }
}
