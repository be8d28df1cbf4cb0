//! Connection wizard state machine.
//!
//! Drives instance creation, QR display, and polling-based confirmation:
//! `Idle → Creating → AwaitingScan → {Confirmed | Failed}`. After the
//! configured number of "not yet connected" probes the current QR code is
//! treated as expired: polling stops, exactly one fresh code is fetched,
//! and scanning resumes with the attempt counter reset.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PairingConfig;
use crate::provider::{EvolutionClient, ProviderError, QrCode};

/// Input collected from the tenant before the wizard starts.
#[derive(Debug, Clone)]
pub struct WizardParams {
    pub instance_name: String,
    pub webhook_path: String,
}

impl WizardParams {
    /// Field-level validation; failures never reach the network.
    pub fn validate(&self) -> Result<(), WizardValidationError> {
        if self.instance_name.trim().is_empty() {
            return Err(WizardValidationError::EmptyInstanceName);
        }
        if self.webhook_path.trim().is_empty() {
            return Err(WizardValidationError::EmptyWebhookPath);
        }
        Ok(())
    }
}

/// Field-level validation errors keeping the wizard at `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardValidationError {
    #[error("instance name must not be empty")]
    EmptyInstanceName,
    #[error("webhook path must not be empty")]
    EmptyWebhookPath,
}

/// Wizard states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    Idle,
    Creating,
    AwaitingScan { attempt: u32 },
    Confirmed,
    Failed { reason: String },
}

/// Progress events surfaced to the embedding UI.
#[derive(Debug, Clone)]
pub enum WizardEvent {
    StateChanged(WizardState),
    /// A scannable code is available. Each new code replaces the previous
    /// one; consumers should drop their old copy.
    QrReady(QrCode),
    /// A probe came back "not yet connected".
    PollAttempt { attempt: u32, max: u32 },
    /// The ceiling was hit and a fresh QR code was fetched.
    QrRefreshed,
    Confirmed { instance_name: String },
    Failed { reason: String, retryable: bool },
}

/// Persists a confirmed connection.
///
/// The wizard and the webhook handler share upsert semantics through this
/// seam: the service-side implementation routes into the same status-patch
/// operation the reconciliation pass uses.
#[async_trait]
pub trait ConnectionConfirmer: Send + Sync {
    async fn mark_connected(
        &self,
        user_id: Uuid,
        instance_name: &str,
        remote_jid: Option<String>,
    ) -> anyhow::Result<()>;
}

/// The connection wizard.
pub struct PairingWizard {
    provider: Arc<EvolutionClient>,
    confirmer: Arc<dyn ConnectionConfirmer>,
    user_id: Uuid,
    poll_interval: Duration,
    max_attempts: u32,
    events: mpsc::Sender<WizardEvent>,
}

impl PairingWizard {
    /// Create a wizard for one tenant.
    pub fn new(
        provider: Arc<EvolutionClient>,
        confirmer: Arc<dyn ConnectionConfirmer>,
        user_id: Uuid,
        config: &PairingConfig,
        events: mpsc::Sender<WizardEvent>,
    ) -> Self {
        Self {
            provider,
            confirmer,
            user_id,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_attempts: config.max_poll_attempts,
            events,
        }
    }

    /// Override the polling cadence (primarily for tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run the wizard to a terminal state or cancellation.
    ///
    /// Validation failures return `Err` with the offending field and leave
    /// no side effects. Cancellation returns the state the wizard was in;
    /// the polling timer dies with this future, so no probe outlives the
    /// caller.
    pub async fn run(
        &self,
        params: WizardParams,
        shutdown: CancellationToken,
    ) -> Result<WizardState, WizardValidationError> {
        params.validate()?;
        let name = params.instance_name.trim().to_string();

        self.emit(WizardEvent::StateChanged(WizardState::Creating))
            .await;
        info!(instance_name = %name, user_id = %self.user_id, "Creating provider instance");

        let qr = match self
            .provider
            .create_instance(&name, params.webhook_path.trim())
            .await
        {
            Ok(qr) => qr,
            Err(err) => return Ok(self.fail_create(err).await),
        };

        self.await_scan(&name, qr, shutdown).await
    }

    async fn fail_create(&self, err: ProviderError) -> WizardState {
        warn!(error = %err, "Instance creation failed");
        let retryable = err.is_retryable();
        self.emit(WizardEvent::Failed {
            reason: err.to_string(),
            retryable,
        })
        .await;
        // Creation failures put the form back in front of the tenant.
        self.emit(WizardEvent::StateChanged(WizardState::Idle)).await;
        WizardState::Idle
    }

    async fn await_scan(
        &self,
        name: &str,
        qr: QrCode,
        shutdown: CancellationToken,
    ) -> Result<WizardState, WizardValidationError> {
        // Holding the current code here means each refresh drops the
        // previous image buffer.
        let mut current_qr = qr;
        let mut attempt: u32 = 0;

        self.emit(WizardEvent::QrReady(current_qr.clone())).await;
        self.emit(WizardEvent::StateChanged(WizardState::AwaitingScan {
            attempt,
        }))
        .await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(instance_name = %name, "Wizard cancelled while awaiting scan");
                    return Ok(WizardState::AwaitingScan { attempt });
                }
                _ = sleep(self.poll_interval) => {}
            }

            match self.provider.fetch_connection_state(name).await {
                Ok(state) if state.is_open() => {
                    return Ok(self.confirm(name).await);
                }
                Ok(_) => {
                    attempt += 1;
                    debug!(
                        instance_name = %name,
                        attempt,
                        max = self.max_attempts,
                        "Instance not yet connected"
                    );
                    self.emit(WizardEvent::PollAttempt {
                        attempt,
                        max: self.max_attempts,
                    })
                    .await;
                }
                Err(err) => {
                    // A flaky probe burns an attempt rather than aborting;
                    // the QR refresh path below recovers either way.
                    attempt += 1;
                    warn!(instance_name = %name, error = %err, "Connection probe failed");
                    self.emit(WizardEvent::PollAttempt {
                        attempt,
                        max: self.max_attempts,
                    })
                    .await;
                }
            }

            if attempt >= self.max_attempts {
                self.emit(WizardEvent::StateChanged(WizardState::Failed {
                    reason: "scan window elapsed".to_string(),
                }))
                .await;

                // The old code has likely expired; fetch exactly one fresh
                // one and resume scanning from zero.
                match self.provider.fetch_qr_code(name).await {
                    Ok(fresh) => {
                        current_qr = fresh;
                        attempt = 0;
                        info!(instance_name = %name, "QR code refreshed after scan window elapsed");
                        self.emit(WizardEvent::QrRefreshed).await;
                        self.emit(WizardEvent::QrReady(current_qr.clone())).await;
                        self.emit(WizardEvent::StateChanged(WizardState::AwaitingScan {
                            attempt,
                        }))
                        .await;
                    }
                    Err(err) => {
                        warn!(instance_name = %name, error = %err, "QR refresh failed");
                        let reason = err.to_string();
                        self.emit(WizardEvent::Failed {
                            reason: reason.clone(),
                            retryable: err.is_retryable(),
                        })
                        .await;
                        return Ok(WizardState::Failed { reason });
                    }
                }
            }
        }
    }

    async fn confirm(&self, name: &str) -> WizardState {
        info!(instance_name = %name, user_id = %self.user_id, "Scan confirmed");

        match self
            .confirmer
            .mark_connected(self.user_id, name, None)
            .await
        {
            Ok(()) => {
                self.emit(WizardEvent::Confirmed {
                    instance_name: name.to_string(),
                })
                .await;
                self.emit(WizardEvent::StateChanged(WizardState::Confirmed))
                    .await;
                WizardState::Confirmed
            }
            Err(err) => {
                warn!(error = %err, "Failed to persist confirmed connection");
                let reason = format!("failed to persist connection: {}", err);
                self.emit(WizardEvent::Failed {
                    reason: reason.clone(),
                    retryable: true,
                })
                .await;
                WizardState::Failed { reason }
            }
        }
    }

    async fn emit(&self, event: WizardEvent) {
        // A departed listener must not stall the state machine.
        let _ = self.events.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_validation_catches_empty_fields() {
        let empty_name = WizardParams {
            instance_name: "  ".to_string(),
            webhook_path: "/webhooks/evolution".to_string(),
        };
        assert_eq!(
            empty_name.validate(),
            Err(WizardValidationError::EmptyInstanceName)
        );

        let empty_path = WizardParams {
            instance_name: "shop1".to_string(),
            webhook_path: "".to_string(),
        };
        assert_eq!(
            empty_path.validate(),
            Err(WizardValidationError::EmptyWebhookPath)
        );

        let ok = WizardParams {
            instance_name: "shop1".to_string(),
            webhook_path: "/webhooks/evolution".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
