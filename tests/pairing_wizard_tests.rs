//! Integration tests for the connection wizard state machine against a mock
//! provider: retry ceiling, QR refresh with counter reset, confirmation
//! through the shared mark-connected seam, and cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use evosync::config::{EvolutionConfig, PairingConfig};
use evosync::pairing::{
    ConnectionConfirmer, PairingWizard, WizardEvent, WizardParams, WizardState,
    WizardValidationError,
};
use evosync::provider::EvolutionClient;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

#[derive(Default)]
struct RecordingConfirmer {
    calls: Mutex<Vec<(Uuid, String, Option<String>)>>,
}

#[async_trait]
impl ConnectionConfirmer for RecordingConfirmer {
    async fn mark_connected(
        &self,
        user_id: Uuid,
        instance_name: &str,
        remote_jid: Option<String>,
    ) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id, instance_name.to_string(), remote_jid));
        Ok(())
    }
}

fn provider_for(server: &MockServer) -> Arc<EvolutionClient> {
    Arc::new(
        EvolutionClient::from_config(&EvolutionConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            webhook_base_url: "https://app.example.com".to_string(),
            request_timeout_seconds: 5,
        })
        .unwrap(),
    )
}

fn qr_body(tag: &str) -> serde_json::Value {
    json!({
        "instance": {"instanceName": "shop1"},
        "qrcode": {"code": tag, "base64": BASE64.encode(tag.as_bytes())}
    })
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(201).set_body_json(qr_body("first-qr")))
        .mount(server)
        .await;
}

fn build_wizard(
    provider: Arc<EvolutionClient>,
    confirmer: Arc<RecordingConfirmer>,
    user_id: Uuid,
) -> (PairingWizard, mpsc::Receiver<WizardEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let wizard = PairingWizard::new(
        provider,
        confirmer,
        user_id,
        &PairingConfig::default(),
        tx,
    )
    .with_poll_interval(Duration::from_millis(30));
    (wizard, rx)
}

fn params() -> WizardParams {
    WizardParams {
        instance_name: "shop1".to_string(),
        webhook_path: "/webhooks/evolution".to_string(),
    }
}

#[tokio::test]
async fn retry_ceiling_triggers_exactly_one_qr_refresh_and_resets_counter() {
    let mock_server = MockServer::start().await;
    mount_create(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/instance/connectionState/shop1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "close"}})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instance/connect/shop1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "refreshed-qr",
            "base64": BASE64.encode(b"refreshed-qr")
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let confirmer = Arc::new(RecordingConfirmer::default());
    let (wizard, mut events) = build_wizard(provider_for(&mock_server), Arc::clone(&confirmer), Uuid::new_v4());

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { wizard.run(params(), run_cancel).await });

    let mut attempts_before_refresh = Vec::new();
    let mut saw_refresh = false;
    let mut first_attempt_after_refresh = None;

    while first_attempt_after_refresh.is_none() {
        let event = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("wizard event within deadline")
            .expect("event channel open");

        match event {
            WizardEvent::PollAttempt { attempt, .. } if !saw_refresh => {
                attempts_before_refresh.push(attempt);
            }
            WizardEvent::QrRefreshed => {
                saw_refresh = true;
            }
            WizardEvent::PollAttempt { attempt, .. } => {
                first_attempt_after_refresh = Some(attempt);
            }
            _ => {}
        }
    }

    // Exactly three "not yet" probes against the original code, then one
    // refresh, then the counter starts over.
    assert_eq!(attempts_before_refresh, vec![1, 2, 3]);
    assert_eq!(first_attempt_after_refresh, Some(1));
    assert!(confirmer.calls.lock().unwrap().is_empty());

    cancel.cancel();
    let state = run.await.unwrap().unwrap();
    assert!(matches!(state, WizardState::AwaitingScan { .. }));

    // MockServer verifies the single /instance/connect expectation on drop.
}

#[tokio::test]
async fn open_state_confirms_through_the_shared_seam() {
    let mock_server = MockServer::start().await;
    mount_create(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/instance/connectionState/shop1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "close"}})),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instance/connectionState/shop1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "open"}})),
        )
        .mount(&mock_server)
        .await;

    let confirmer = Arc::new(RecordingConfirmer::default());
    let user_id = Uuid::new_v4();
    let (wizard, mut events) = build_wizard(provider_for(&mock_server), Arc::clone(&confirmer), user_id);

    let state = timeout(
        Duration::from_secs(5),
        wizard.run(params(), CancellationToken::new()),
    )
    .await
    .expect("wizard finishes")
    .unwrap();

    assert_eq!(state, WizardState::Confirmed);

    let calls = confirmer.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, user_id);
    assert_eq!(calls[0].1, "shop1");

    let mut saw_confirmed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, WizardEvent::Confirmed { .. }) {
            saw_confirmed = true;
        }
    }
    assert!(saw_confirmed);
}

#[tokio::test]
async fn create_failure_surfaces_retryable_error_and_returns_to_idle() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let confirmer = Arc::new(RecordingConfirmer::default());
    let (wizard, mut events) = build_wizard(provider_for(&mock_server), confirmer, Uuid::new_v4());

    let state = wizard
        .run(params(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(state, WizardState::Idle);

    let mut saw_retryable_failure = false;
    while let Ok(event) = events.try_recv() {
        if let WizardEvent::Failed { retryable, .. } = event {
            saw_retryable_failure = retryable;
        }
    }
    assert!(saw_retryable_failure);
}

#[tokio::test]
async fn qr_refresh_failure_is_terminal() {
    let mock_server = MockServer::start().await;
    mount_create(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/instance/connectionState/shop1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "close"}})),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instance/connect/shop1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("no qr for you"))
        .mount(&mock_server)
        .await;

    let confirmer = Arc::new(RecordingConfirmer::default());
    let (wizard, _events) = build_wizard(provider_for(&mock_server), confirmer, Uuid::new_v4());

    let state = timeout(
        Duration::from_secs(5),
        wizard.run(params(), CancellationToken::new()),
    )
    .await
    .expect("wizard finishes")
    .unwrap();

    assert!(matches!(state, WizardState::Failed { .. }));
}

#[tokio::test]
async fn validation_failure_never_reaches_the_network() {
    let mock_server = MockServer::start().await;
    // No mocks mounted: any request would 404 and the expectations below
    // would not hold if the wizard hit the network.

    let confirmer = Arc::new(RecordingConfirmer::default());
    let (wizard, _events) = build_wizard(provider_for(&mock_server), confirmer, Uuid::new_v4());

    let err = wizard
        .run(
            WizardParams {
                instance_name: "".to_string(),
                webhook_path: "/webhooks/evolution".to_string(),
            },
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, WizardValidationError::EmptyInstanceName);
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_stops_polling_immediately() {
    let mock_server = MockServer::start().await;
    mount_create(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/instance/connectionState/shop1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"instance": {"state": "close"}})),
        )
        .mount(&mock_server)
        .await;

    let confirmer = Arc::new(RecordingConfirmer::default());
    let (wizard, _events) = build_wizard(provider_for(&mock_server), confirmer, Uuid::new_v4());

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { wizard.run(params(), run_cancel).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let state = timeout(Duration::from_secs(2), run)
        .await
        .expect("wizard exits promptly after cancellation")
        .unwrap()
        .unwrap();
    assert!(matches!(state, WizardState::AwaitingScan { .. }));

    let polls_at_cancel = mock_server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let polls_after_wait = mock_server.received_requests().await.unwrap().len();
    assert_eq!(polls_at_cancel, polls_after_wait, "no probes after cancellation");
}
