//! # Data Models
//!
//! SeaORM entity models used throughout the evosync service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod sync_status;
pub mod tenant_instance;
pub mod unmatched_event;

pub use sync_status::Entity as SyncStatus;
pub use tenant_instance::Entity as TenantInstance;
pub use unmatched_event::Entity as UnmatchedEvent;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "evosync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
