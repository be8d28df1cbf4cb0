//! Integration tests for the provider webhook endpoint: exact-match
//! resolution, acknowledgement semantics, idempotence, and the
//! unmatched-event review queue.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use evosync::config::{AppConfig, EvolutionConfig};
use evosync::feed::StatusFeed;
use evosync::models::tenant_instance::Entity as TenantInstance;
use evosync::provider::EvolutionClient;
use evosync::server::{AppState, create_app};
use sea_orm::EntityTrait;
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use uuid::Uuid;

mod test_utils;
use test_utils::{insert_tenant_instance, setup_test_db_arc};

async fn app_state() -> (AppState, Arc<sea_orm::DatabaseConnection>) {
    let db = setup_test_db_arc().await.unwrap();
    let config = Arc::new(AppConfig {
        operator_tokens: vec!["test-token".to_string()],
        evolution: EvolutionConfig {
            api_key: Some("test-key".to_string()),
            ..EvolutionConfig::default()
        },
        ..AppConfig::default()
    });
    let provider = Arc::new(EvolutionClient::from_config(&config.evolution).unwrap());
    let state = AppState::new(config, Arc::clone(&db), provider, StatusFeed::default());
    (state, db)
}

async fn post_event(state: &AppState, payload: JsonValue) -> (StatusCode, JsonValue) {
    let app = create_app(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/evolution")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, body)
}

fn connection_update(instance_name: &str, status: &str) -> JsonValue {
    json!({
        "event": "CONNECTION_UPDATE",
        "instance": {"instanceName": instance_name, "status": status},
        "data": {
            "remoteJid": "5511999999999@s.whatsapp.net",
            "displayName": "Shop One"
        }
    })
}

#[tokio::test]
async fn matched_connection_update_marks_record_connected() {
    let (state, db) = app_state().await;
    let user_id = Uuid::new_v4();
    insert_tenant_instance(&db, user_id, "shop1@example.com", Some("shop1"), false)
        .await
        .unwrap();

    let (status, body) = post_event(&state, connection_update("shop1", "open")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["event"], json!("CONNECTION_UPDATE"));
    assert_eq!(body["instance"], json!("shop1"));

    let record = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_connected);
    assert!(record.connected_at.is_some());
    assert!(record.disconnected_at.is_none());
    assert_eq!(
        record.remote_jid.as_deref(),
        Some("5511999999999@s.whatsapp.net")
    );
    assert_eq!(record.profile_name.as_deref(), Some("Shop One"));
    assert!(record.provider_raw_snapshot.is_some(), "raw event kept for audit");
}

#[tokio::test]
async fn connected_status_spelling_is_accepted() {
    let (state, db) = app_state().await;
    let user_id = Uuid::new_v4();
    insert_tenant_instance(&db, user_id, "shop1@example.com", Some("shop1"), false)
        .await
        .unwrap();

    let (status, _) = post_event(&state, connection_update("shop1", "connected")).await;
    assert_eq!(status, StatusCode::OK);

    let record = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_connected);
}

#[tokio::test]
async fn duplicate_event_does_not_churn_connected_at() {
    let (state, db) = app_state().await;
    let user_id = Uuid::new_v4();
    insert_tenant_instance(&db, user_id, "shop1@example.com", Some("shop1"), false)
        .await
        .unwrap();

    post_event(&state, connection_update("shop1", "open")).await;
    let first = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    post_event(&state, connection_update("shop1", "open")).await;
    let second = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();

    assert!(second.is_connected);
    assert_eq!(second.connected_at, first.connected_at);
    assert!(second.last_sync_at >= first.last_sync_at);
}

#[tokio::test]
async fn unresolved_event_is_acknowledged_queued_and_writes_nothing() {
    let (state, db) = app_state().await;

    let (status, body) = post_event(&state, connection_update("unknown123", "open")).await;

    // Acknowledged so the provider does not retry-storm.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let records = TenantInstance::find().all(db.as_ref()).await.unwrap();
    assert!(records.is_empty(), "no tenant record was invented");

    let queued = state.unmatched_events().list_unreviewed(10).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].instance_name, "unknown123");
    assert_eq!(queued[0].status, "open");
    assert!(!queued[0].reviewed);
}

#[tokio::test]
async fn unbound_record_is_never_auto_bound() {
    let (state, db) = app_state().await;
    let candidate = Uuid::new_v4();
    // A record with no instance binding exists; the event must NOT be
    // attached to it.
    insert_tenant_instance(&db, candidate, "candidate@example.com", None, false)
        .await
        .unwrap();

    let (status, _) = post_event(&state, connection_update("unknown123", "open")).await;
    assert_eq!(status, StatusCode::OK);

    let record = TenantInstance::find_by_id(candidate)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(record.instance_name.is_none());
    assert!(!record.is_connected);

    assert_eq!(state.unmatched_events().count_unreviewed().await.unwrap(), 1);
}

#[tokio::test]
async fn qrcode_updated_event_is_acknowledged_without_writes() {
    let (state, db) = app_state().await;
    let user_id = Uuid::new_v4();
    insert_tenant_instance(&db, user_id, "shop1@example.com", Some("shop1"), false)
        .await
        .unwrap();

    let (status, body) = post_event(
        &state,
        json!({
            "event": "QRCODE_UPDATED",
            "instance": {"instanceName": "shop1", "status": "close"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let record = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!record.is_connected);
    assert!(record.last_sync_at.is_none());
}

#[tokio::test]
async fn close_status_update_does_not_write() {
    let (state, db) = app_state().await;
    let user_id = Uuid::new_v4();
    insert_tenant_instance(&db, user_id, "shop1@example.com", Some("shop1"), false)
        .await
        .unwrap();

    let (status, _) = post_event(&state, connection_update("shop1", "close")).await;
    assert_eq!(status, StatusCode::OK);

    let record = TenantInstance::find_by_id(user_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!record.is_connected);
    assert!(record.last_sync_at.is_none());
}

#[tokio::test]
async fn malformed_event_payload_is_rejected() {
    let (state, _db) = app_state().await;

    // Valid JSON, wrong shape.
    let (status, _) = post_event(&state, json!({"event": "CONNECTION_UPDATE"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_json_body_is_rejected() {
    let (state, _db) = app_state().await;
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/evolution")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
