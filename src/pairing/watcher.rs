//! Live connection-status watcher for a single tenant.
//!
//! Keeps a [`ConnectionView`] in sync with server-side state across three
//! channels: realtime change notifications, visibility-regained re-checks,
//! and a fixed-interval fallback poll. All channels plus the
//! manual-disconnect guard window are driven by one task and torn down as a
//! unit through the handle's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::WatcherConfig;
use crate::feed::{RecordChange, StatusFeed};

/// Snapshot of a tenant's connection status as shown to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionView {
    pub is_connected: bool,
    pub instance_name: Option<String>,
    pub remote_jid: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
}

/// Server-side status lookup used by the initial fetch and both re-check
/// channels.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, user_id: Uuid) -> anyhow::Result<ConnectionView>;
}

enum WatcherCommand {
    ManualDisconnect,
}

/// Watcher for one tenant's connection status.
pub struct StatusWatcher {
    fetcher: Arc<dyn StatusFetcher>,
    user_id: Uuid,
    realtime_enabled: bool,
    poll_enabled: bool,
    visibility_enabled: bool,
    poll_interval: Duration,
    visibility_debounce: Duration,
    guard_window: Duration,
}

impl StatusWatcher {
    /// Create a watcher from externally-supplied configuration; nothing is
    /// re-read later.
    pub fn new(fetcher: Arc<dyn StatusFetcher>, user_id: Uuid, config: &WatcherConfig) -> Self {
        Self {
            fetcher,
            user_id,
            realtime_enabled: config.realtime_enabled,
            poll_enabled: config.poll_enabled,
            visibility_enabled: config.visibility_enabled,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            visibility_debounce: Duration::from_millis(config.visibility_debounce_ms),
            guard_window: Duration::from_secs(config.disconnect_guard_seconds),
        }
    }

    /// Override the fallback poll cadence (primarily for tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the guard window (primarily for tests).
    pub fn with_guard_window(mut self, window: Duration) -> Self {
        self.guard_window = window;
        self
    }

    /// Override the visibility debounce (primarily for tests).
    pub fn with_visibility_debounce(mut self, debounce: Duration) -> Self {
        self.visibility_debounce = debounce;
        self
    }

    /// Start the watcher task.
    ///
    /// `visibility` delivers one message per visibility-regained signal
    /// (tab refocus); callers without such a signal can pass a receiver
    /// whose sender is dropped immediately.
    pub fn spawn(self, feed: &StatusFeed, visibility: mpsc::Receiver<()>) -> WatcherHandle {
        let (state_tx, state_rx) = watch::channel(ConnectionView::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let feed_rx = feed.subscribe();

        let task = tokio::spawn(self.run(
            cancel.clone(),
            feed_rx,
            visibility,
            command_rx,
            state_tx,
        ));

        WatcherHandle {
            state: state_rx,
            commands: command_tx,
            cancel,
            task,
        }
    }

    async fn run(
        self,
        cancel: CancellationToken,
        mut feed_rx: broadcast::Receiver<RecordChange>,
        mut visibility: mpsc::Receiver<()>,
        mut commands: mpsc::UnboundedReceiver<WatcherCommand>,
        state_tx: watch::Sender<ConnectionView>,
    ) {
        // One synchronous fetch on start so the UI never renders a guess.
        refetch(&*self.fetcher, self.user_id, &state_tx).await;

        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        let mut realtime_open = self.realtime_enabled;
        let mut visibility_open = self.visibility_enabled;
        let mut visibility_deadline: Option<Instant> = None;
        let mut guard_until: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(user_id = %self.user_id, "Status watcher shutting down");
                    break;
                }

                result = feed_rx.recv(), if realtime_open => match result {
                    Ok(change) => self.handle_change(change, guard_until, &state_tx),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events are unrecoverable per-event; a fresh
                        // fetch resynchronizes in one call.
                        warn!(user_id = %self.user_id, skipped, "Realtime feed lagged; resyncing");
                        refetch(&*self.fetcher, self.user_id, &state_tx).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(user_id = %self.user_id, "Realtime feed closed");
                        realtime_open = false;
                    }
                },

                _ = poll.tick(), if self.poll_enabled => {
                    debug!(user_id = %self.user_id, "Fallback poll re-check");
                    refetch(&*self.fetcher, self.user_id, &state_tx).await;
                }

                maybe = visibility.recv(), if visibility_open => match maybe {
                    Some(()) => {
                        visibility_deadline =
                            Some(Instant::now() + self.visibility_debounce);
                    }
                    None => visibility_open = false,
                },

                _ = sleep_until(visibility_deadline.unwrap_or_else(Instant::now)),
                    if visibility_deadline.is_some() =>
                {
                    visibility_deadline = None;
                    debug!(user_id = %self.user_id, "Visibility-regained re-check");
                    refetch(&*self.fetcher, self.user_id, &state_tx).await;
                }

                maybe = commands.recv() => match maybe {
                    Some(WatcherCommand::ManualDisconnect) => {
                        guard_until = Some(Instant::now() + self.guard_window);
                        // Reflect the disconnect immediately; stale pushes
                        // inside the window cannot resurrect the connection.
                        state_tx.send_replace(ConnectionView {
                            is_connected: false,
                            instance_name: None,
                            remote_jid: None,
                            checked_at: Some(Utc::now()),
                        });
                    }
                    None => {
                        // Handle dropped without explicit shutdown.
                        break;
                    }
                },
            }
        }
    }

    fn handle_change(
        &self,
        change: RecordChange,
        guard_until: Option<Instant>,
        state_tx: &watch::Sender<ConnectionView>,
    ) {
        if change.user_id != self.user_id {
            return;
        }

        if guard_until.is_some_and(|deadline| Instant::now() < deadline) {
            debug!(
                user_id = %self.user_id,
                is_connected = change.is_connected,
                "Ignoring realtime event inside manual-disconnect guard window"
            );
            return;
        }

        state_tx.send_replace(ConnectionView {
            is_connected: change.is_connected,
            instance_name: change.instance_name,
            remote_jid: change.remote_jid,
            checked_at: Some(change.changed_at),
        });
    }
}

async fn refetch(
    fetcher: &dyn StatusFetcher,
    user_id: Uuid,
    state_tx: &watch::Sender<ConnectionView>,
) {
    match fetcher.fetch_status(user_id).await {
        Ok(view) => {
            state_tx.send_replace(view);
        }
        Err(err) => {
            // Keep showing the last known state rather than erasing it.
            warn!(user_id = %user_id, error = %err, "Status fetch failed");
        }
    }
}

/// Handle to a running watcher. Dropping it without `shutdown` ends the
/// task as soon as the command channel closes.
pub struct WatcherHandle {
    state: watch::Receiver<ConnectionView>,
    commands: mpsc::UnboundedSender<WatcherCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Current-state receiver; `borrow` for the latest view, `changed` to
    /// await updates.
    pub fn state(&self) -> watch::Receiver<ConnectionView> {
        self.state.clone()
    }

    /// Arm the manual-disconnect guard: the view clears immediately and
    /// realtime events are ignored until the window elapses.
    pub fn begin_manual_disconnect(&self) {
        let _ = self.commands.send(WatcherCommand::ManualDisconnect);
    }

    /// Tear down the subscription and every timer as one unit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
