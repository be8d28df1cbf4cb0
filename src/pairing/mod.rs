//! Client-side pairing support.
//!
//! The connection wizard and the status watcher are modeled as explicit
//! cancellable tasks: every timer lives inside one task guarded by a
//! [`tokio_util::sync::CancellationToken`], so teardown is atomic and
//! testable without fake-timer machinery.

pub mod watcher;
pub mod wizard;

pub use watcher::{ConnectionView, StatusFetcher, StatusWatcher, WatcherHandle};
pub use wizard::{
    ConnectionConfirmer, PairingWizard, WizardEvent, WizardParams, WizardState,
    WizardValidationError,
};
