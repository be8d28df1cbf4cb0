//! Wire types for the Evolution API.
//!
//! Shapes mirror the provider's JSON surface; everything the reconciliation
//! pass persists is folded into the tenant record rather than stored as its
//! own entity.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Event name for connection-state changes pushed by the provider.
pub const EVENT_CONNECTION_UPDATE: &str = "CONNECTION_UPDATE";

/// Event name for QR-code refreshes pushed by the provider. Acknowledged but
/// never persisted.
pub const EVENT_QRCODE_UPDATED: &str = "QRCODE_UPDATED";

/// Session state reported by the provider for a single instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Session is established and usable.
    Open,
    /// No session; the instance awaits pairing.
    Closed,
    /// Pairing handshake in progress.
    Connecting,
    /// Any state string this client does not recognize.
    Other(String),
}

impl InstanceState {
    /// Parse a provider state string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "open" => InstanceState::Open,
            "close" | "closed" => InstanceState::Closed,
            "connecting" => InstanceState::Connecting,
            other => InstanceState::Other(other.to_string()),
        }
    }

    /// True iff the session is established.
    pub fn is_open(&self) -> bool {
        matches!(self, InstanceState::Open)
    }

    /// The provider's wire spelling of this state.
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Open => "open",
            InstanceState::Closed => "close",
            InstanceState::Connecting => "connecting",
            InstanceState::Other(raw) => raw,
        }
    }
}

/// Whether a webhook status string counts as an established session.
pub fn is_connected_status(status: &str) -> bool {
    matches!(status, "open" | "connected")
}

/// One instance as returned by the bulk `fetchInstances` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub instance_name: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Session status string (`open`, `close`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Remote WhatsApp account identifier bound to the session.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub profile_status: Option<String>,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub apikey: Option<String>,
    #[serde(default)]
    pub integration: Option<JsonValue>,
}

impl InstanceSnapshot {
    /// True iff the provider reports this instance's session as open.
    pub fn is_open(&self) -> bool {
        self.status.as_deref() == Some("open")
    }
}

/// Wrapper element of the `fetchInstances` response array.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FetchInstancesEntry {
    pub instance: InstanceSnapshot,
}

/// QR payload as the provider serializes it.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QrCodePayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub base64: Option<String>,
}

/// Response of `POST /instance/create`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateInstanceResponse {
    #[serde(default)]
    pub instance: Option<CreatedInstance>,
    #[serde(default)]
    pub hash: Option<InstanceHash>,
    #[serde(default)]
    pub qrcode: Option<QrCodePayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedInstance {
    pub instance_name: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InstanceHash {
    #[serde(default)]
    pub apikey: Option<String>,
}

/// Response of `GET /instance/connectionState/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectionStateResponse {
    pub instance: ConnectionStateInstance,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConnectionStateInstance {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ConnectionStateResponse {
    /// The provider has shipped this field under both names across versions.
    pub fn state(&self) -> InstanceState {
        let raw = self
            .instance
            .state
            .as_deref()
            .or(self.instance.status.as_deref())
            .unwrap_or("");
        InstanceState::parse(raw)
    }
}

/// A scannable QR code handed to the pairing UI.
///
/// The image buffer is owned; replacing a [`QrCode`] drops the previous
/// buffer so repeated refreshes do not accumulate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCode {
    /// Copyable pairing code, when the provider supplies one.
    pub pairing_code: Option<String>,
    /// Decoded PNG bytes of the scannable image.
    pub image: Vec<u8>,
}

impl QrCode {
    pub(crate) fn from_payload(payload: QrCodePayload) -> Option<Self> {
        let base64 = payload.base64?;
        // The provider returns a data URL; strip the media-type prefix.
        let encoded = base64.rsplit_once(',').map(|(_, b)| b).unwrap_or(&base64);
        let image = BASE64.decode(encoded.trim()).ok()?;
        Some(Self {
            pairing_code: payload.code,
            image,
        })
    }
}

/// Connection-update event pushed by the provider to our webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub event: String,
    pub instance: EventInstance,
    #[serde(default)]
    pub data: EventData,
}

/// Instance block of a pushed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInstance {
    pub instance_name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Optional profile data carried by a pushed event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
}
