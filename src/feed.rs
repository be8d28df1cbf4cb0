//! Realtime change-notification feed.
//!
//! Repository writes publish a [`RecordChange`] here; status watchers
//! subscribe and filter for their own tenant. This is the in-process
//! equivalent of a database change feed: lossy for slow consumers
//! (broadcast semantics), with interval polling as the safety net.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One observed change to a tenant record's connection state.
#[derive(Debug, Clone)]
pub struct RecordChange {
    pub user_id: Uuid,
    pub instance_name: Option<String>,
    pub is_connected: bool,
    pub remote_jid: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Broadcast fan-out of record changes to any number of watchers.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    tx: broadcast::Sender<RecordChange>,
}

impl StatusFeed {
    /// Create a feed retaining up to `capacity` undelivered events per
    /// subscriber before older ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: RecordChange) {
        let receivers = self.tx.receiver_count();
        if self.tx.send(change).is_err() {
            tracing::trace!("Record change published with no active subscribers");
        } else {
            tracing::debug!(receivers, "Record change published");
        }
    }

    /// Subscribe to all subsequent changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.tx.subscribe()
    }
}

impl Default for StatusFeed {
    fn default() -> Self {
        Self::new(64)
    }
}
