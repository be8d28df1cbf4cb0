//! Pure computation of connection-state mutations.
//!
//! Every writer (reconciliation batch, webhook handler, wizard confirm)
//! derives its record mutation here, so the three trigger paths cannot
//! drift apart. The computation is idempotent: feeding it unchanged
//! provider data re-stamps `last_sync_at` and nothing else.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::models::tenant_instance::Model;
use crate::provider::{EventData, InstanceSnapshot};

/// The full set of fields a status write touches.
///
/// Applied by the repository as one update statement, so `is_connected`
/// and its paired timestamps can never be observed torn.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub instance_name: String,
    pub is_connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub remote_jid: Option<String>,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub profile_status: Option<String>,
    pub provider_instance_id: Option<String>,
    pub provider_api_key: Option<String>,
    pub provider_integration: Option<JsonValue>,
    pub provider_raw_snapshot: Option<JsonValue>,
    pub last_sync_at: DateTime<Utc>,
}

impl StatusPatch {
    /// Fold a full provider snapshot into the record.
    ///
    /// Profile and passthrough fields are copied through exactly as the
    /// provider reported them; the transition timestamps move only when the
    /// connected flag actually flips.
    pub fn from_snapshot(record: &Model, snapshot: &InstanceSnapshot, now: DateTime<Utc>) -> Self {
        let connected = snapshot.is_open();
        let (connected_at, disconnected_at) = transition_timestamps(record, connected, now);

        Self {
            instance_name: snapshot.instance_name.clone(),
            is_connected: connected,
            connected_at,
            disconnected_at,
            remote_jid: snapshot
                .owner
                .clone()
                .or_else(|| existing_remote_jid(record)),
            profile_name: snapshot.profile_name.clone(),
            profile_picture_url: snapshot.profile_picture_url.clone(),
            profile_status: snapshot.profile_status.clone(),
            provider_instance_id: snapshot.instance_id.clone(),
            provider_api_key: snapshot.apikey.clone(),
            provider_integration: snapshot.integration.clone(),
            provider_raw_snapshot: serde_json::to_value(snapshot).ok(),
            last_sync_at: now,
        }
    }

    /// Mark the record connected from a pushed connection-update event or
    /// the wizard's confirm call.
    ///
    /// Events carry partial profile data, so absent fields keep their
    /// stored values instead of being cleared.
    pub fn connected_event(
        record: &Model,
        instance_name: &str,
        data: &EventData,
        raw_payload: Option<JsonValue>,
        now: DateTime<Utc>,
    ) -> Self {
        let (connected_at, disconnected_at) = transition_timestamps(record, true, now);

        Self {
            instance_name: instance_name.to_string(),
            is_connected: true,
            connected_at,
            disconnected_at,
            remote_jid: data
                .remote_jid
                .clone()
                .or_else(|| existing_remote_jid(record)),
            profile_name: data
                .display_name
                .clone()
                .or_else(|| record.profile_name.clone()),
            profile_picture_url: data
                .profile_pic_url
                .clone()
                .or_else(|| record.profile_picture_url.clone()),
            profile_status: record.profile_status.clone(),
            provider_instance_id: record.provider_instance_id.clone(),
            provider_api_key: record.provider_api_key.clone(),
            provider_integration: record.provider_integration.clone(),
            provider_raw_snapshot: raw_payload.or_else(|| record.provider_raw_snapshot.clone()),
            last_sync_at: now,
        }
    }
}

/// Stamp transition timestamps only when the connected flag flips.
///
/// Connected implies `connected_at` set and `disconnected_at` null; the
/// inverse holds once a disconnect has been observed.
fn transition_timestamps(
    record: &Model,
    connected: bool,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    if connected {
        let connected_at = if record.is_connected {
            record
                .connected_at
                .map(|ts| ts.with_timezone(&Utc))
                .or(Some(now))
        } else {
            Some(now)
        };
        (connected_at, None)
    } else {
        let disconnected_at = if record.is_connected {
            Some(now)
        } else {
            record
                .disconnected_at
                .map(|ts| ts.with_timezone(&Utc))
        };
        (None, disconnected_at)
    }
}

fn existing_remote_jid(record: &Model) -> Option<String> {
    record.remote_jid.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn record(connected: bool) -> Model {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        Model {
            user_id: Uuid::new_v4(),
            email: "tenant@example.com".to_string(),
            instance_name: Some("shop1".to_string()),
            is_connected: connected,
            connected_at: connected.then(|| base.into()),
            disconnected_at: (!connected).then(|| base.into()),
            remote_jid: connected.then(|| "5511999999999".to_string()),
            profile_name: Some("Old Name".to_string()),
            profile_picture_url: None,
            profile_status: Some("busy".to_string()),
            provider_instance_id: Some("inst-1".to_string()),
            provider_api_key: None,
            provider_integration: None,
            provider_raw_snapshot: None,
            last_sync_at: Some(base.into()),
            created_at: base.into(),
            updated_at: base.into(),
        }
    }

    fn snapshot(status: &str) -> InstanceSnapshot {
        serde_json::from_value(json!({
            "instanceName": "shop1",
            "instanceId": "inst-1",
            "status": status,
            "owner": "5511999999999",
            "profileName": "Shop One",
            "profilePictureUrl": "https://example.com/pic.jpg",
            "profileStatus": "available"
        }))
        .unwrap()
    }

    #[test]
    fn connecting_stamps_connected_at_and_clears_disconnected_at() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let patch = StatusPatch::from_snapshot(&record(false), &snapshot("open"), now);

        assert!(patch.is_connected);
        assert_eq!(patch.connected_at, Some(now));
        assert_eq!(patch.disconnected_at, None);
        assert_eq!(patch.remote_jid.as_deref(), Some("5511999999999"));
        assert_eq!(patch.profile_name.as_deref(), Some("Shop One"));
    }

    #[test]
    fn disconnecting_stamps_disconnected_at() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let patch = StatusPatch::from_snapshot(&record(true), &snapshot("close"), now);

        assert!(!patch.is_connected);
        assert_eq!(patch.connected_at, None);
        assert_eq!(patch.disconnected_at, Some(now));
    }

    #[test]
    fn reapplying_unchanged_data_only_restamps_last_sync() {
        let first_run = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let second_run = Utc.with_ymd_and_hms(2025, 6, 2, 9, 5, 0).unwrap();

        let before = record(false);
        let first = StatusPatch::from_snapshot(&before, &snapshot("open"), first_run);

        // Simulate the first patch having been applied.
        let mut applied = before.clone();
        applied.is_connected = first.is_connected;
        applied.connected_at = first.connected_at.map(Into::into);
        applied.disconnected_at = first.disconnected_at.map(Into::into);
        applied.remote_jid = first.remote_jid.clone();

        let second = StatusPatch::from_snapshot(&applied, &snapshot("open"), second_run);

        assert_eq!(second.is_connected, first.is_connected);
        assert_eq!(second.connected_at, first.connected_at);
        assert_eq!(second.disconnected_at, first.disconnected_at);
        assert_eq!(second.last_sync_at, second_run);
    }

    #[test]
    fn staying_disconnected_keeps_original_disconnect_timestamp() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let before = record(false);
        let original_disconnect = before.disconnected_at.unwrap().with_timezone(&Utc);

        let patch = StatusPatch::from_snapshot(&before, &snapshot("close"), now);

        assert_eq!(patch.disconnected_at, Some(original_disconnect));
    }

    #[test]
    fn connected_event_preserves_profile_fields_absent_from_event() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let before = record(false);
        let data = EventData {
            remote_jid: Some("5511888888888".to_string()),
            display_name: None,
            profile_pic_url: None,
        };

        let patch = StatusPatch::connected_event(&before, "shop1", &data, None, now);

        assert!(patch.is_connected);
        assert_eq!(patch.remote_jid.as_deref(), Some("5511888888888"));
        assert_eq!(patch.profile_name.as_deref(), Some("Old Name"));
        assert_eq!(patch.profile_status.as_deref(), Some("busy"));
    }

    #[test]
    fn connected_event_is_idempotent_on_connected_at() {
        let first_run = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 2, 9, 10, 0).unwrap();

        let before = record(false);
        let data = EventData::default();

        let first = StatusPatch::connected_event(&before, "shop1", &data, None, first_run);

        let mut applied = before.clone();
        applied.is_connected = true;
        applied.connected_at = first.connected_at.map(Into::into);
        applied.disconnected_at = None;

        let second = StatusPatch::connected_event(&applied, "shop1", &data, None, later);

        assert_eq!(second.connected_at, first.connected_at);
        assert_eq!(second.disconnected_at, None);
        assert_eq!(second.last_sync_at, later);
    }

    #[test]
    fn snapshot_profile_fields_copy_through_even_when_absent() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let bare: InstanceSnapshot = serde_json::from_value(json!({
            "instanceName": "shop1",
            "status": "open"
        }))
        .unwrap();

        let patch = StatusPatch::from_snapshot(&record(true), &bare, now);

        // A reconciliation pass mirrors the provider exactly.
        assert_eq!(patch.profile_name, None);
        assert_eq!(patch.profile_status, None);
        // The remote identifier survives; the provider omits the owner
        // field in some states even while the session stays bound.
        assert_eq!(patch.remote_jid.as_deref(), Some("5511999999999"));
    }
}
