//! Evolution API client
//!
//! Thin typed wrapper over the external messaging provider's
//! instance-management REST surface: instance creation, QR retrieval,
//! connection-state probes, the bulk instance listing used by the
//! reconciliation pass, and best-effort teardown.

mod client;
mod types;

pub use client::{EvolutionClient, TeardownOutcome};
pub use types::{
    ConnectionEvent, EventData, EventInstance, InstanceSnapshot, InstanceState, QrCode,
    EVENT_CONNECTION_UPDATE, EVENT_QRCODE_UPDATED, is_connected_status,
};

use thiserror::Error;

/// Errors surfaced by the Evolution client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key configured; requests must fail before any network I/O.
    #[error("Evolution API key is not configured")]
    MissingApiKey,
    /// Network-level failure reaching the provider.
    #[error("Evolution API unreachable: {detail}")]
    Unavailable { detail: String },
    /// Provider reports the instance name as unknown.
    #[error("Evolution instance '{name}' not found")]
    InstanceNotFound { name: String },
    /// Provider rejected the instance name.
    #[error("Evolution rejected instance name '{name}': {detail}")]
    InvalidName { name: String, detail: String },
    /// Any other non-success response.
    #[error("Evolution API returned status {status}")]
    Unexpected { status: u16, body: Option<String> },
}

impl ProviderError {
    /// Whether retrying the same call later could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Unavailable { .. } => true,
            ProviderError::Unexpected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
