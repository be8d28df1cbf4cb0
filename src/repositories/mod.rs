//! # Repositories
//!
//! Database access layer encapsulating SeaORM operations per table.

pub mod sync_status;
pub mod tenant_instance;
pub mod unmatched_event;

pub use sync_status::SyncStatusRepository;
pub use tenant_instance::TenantInstanceRepository;
pub use unmatched_event::UnmatchedEventRepository;

use chrono::{DateTime, FixedOffset, Utc};

/// Convert a UTC timestamp into the fixed-offset form SeaORM stores.
pub(crate) fn to_db_time(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    DateTime::from_naive_utc_and_offset(dt.naive_utc(), FixedOffset::east_opt(0).expect("UTC offset"))
}
