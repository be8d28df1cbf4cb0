//! # Server Configuration
//!
//! Axum application state, router assembly, and server startup.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::feed::StatusFeed;
use crate::handlers;
use crate::provider::EvolutionClient;
use crate::reconcile::ReconcileJob;
use crate::repositories::{
    SyncStatusRepository, TenantInstanceRepository, UnmatchedEventRepository,
};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub provider: Arc<EvolutionClient>,
    pub feed: StatusFeed,
}

impl AppState {
    /// Assemble state from its shared resources.
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        provider: Arc<EvolutionClient>,
        feed: StatusFeed,
    ) -> Self {
        Self {
            config,
            db,
            provider,
            feed,
        }
    }

    /// Repository over tenant instance records, wired to the change feed.
    pub fn tenant_instances(&self) -> TenantInstanceRepository {
        TenantInstanceRepository::new(Arc::clone(&self.db), self.feed.clone())
    }

    /// Repository over reconciliation job-status rows.
    pub fn sync_status(&self) -> SyncStatusRepository {
        SyncStatusRepository::new(Arc::clone(&self.db))
    }

    /// Repository over the unmatched-event review queue.
    pub fn unmatched_events(&self) -> UnmatchedEventRepository {
        UnmatchedEventRepository::new(Arc::clone(&self.db))
    }

    /// Reconciliation job over this state's provider client and store.
    pub fn reconcile_job(&self) -> ReconcileJob {
        ReconcileJob::new(
            Arc::clone(&self.config),
            Arc::clone(&self.provider),
            self.tenant_instances(),
            self.sync_status(),
        )
    }

    #[cfg(test)]
    pub fn for_tests(config: Arc<AppConfig>) -> Self {
        let provider = EvolutionClient::from_config(&config.evolution)
            .expect("test provider client");
        Self {
            config,
            db: Arc::new(DatabaseConnection::default()),
            provider: Arc::new(provider),
            feed: StatusFeed::default(),
        }
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync/run", post(handlers::sync::run_sync))
        .route("/sync/status", get(handlers::sync::sync_status))
        .route("/instances", post(handlers::instances::create_instance))
        .route("/instances/status", get(handlers::instances::instance_status))
        .route(
            "/instances/confirm",
            post(handlers::instances::confirm_connection),
        )
        .route("/instances/{name}/qr", get(handlers::instances::refresh_qr))
        .route(
            "/instances/{name}/state",
            get(handlers::instances::probe_state),
        )
        .route(
            "/instances/{name}",
            delete(handlers::instances::teardown_instance),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // The provider pushes events here; it cannot carry operator auth.
        .route("/webhooks/evolution", post(handlers::webhooks::receive_event))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given state
pub async fn run_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::clone(&state.config);
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::webhooks::receive_event,
        crate::handlers::sync::run_sync,
        crate::handlers::sync::sync_status,
        crate::handlers::instances::create_instance,
        crate::handlers::instances::refresh_qr,
        crate::handlers::instances::probe_state,
        crate::handlers::instances::confirm_connection,
        crate::handlers::instances::teardown_instance,
        crate::handlers::instances::instance_status,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::webhooks::WebhookAck,
            crate::handlers::sync::SyncRunRequest,
            crate::handlers::sync::SyncRunResponse,
            crate::handlers::sync::SyncStatusEntry,
            crate::handlers::sync::SyncStatusResponse,
            crate::reconcile::ReconcileSummary,
            crate::handlers::instances::CreateInstanceRequest,
            crate::handlers::instances::QrResponse,
            crate::handlers::instances::InstanceStateResponse,
            crate::handlers::instances::ConfirmRequest,
            crate::handlers::instances::TeardownResponse,
            crate::handlers::instances::InstanceStatusResponse,
        )
    ),
    info(
        title = "evosync API",
        description = "WhatsApp-instance connection reconciliation service",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
