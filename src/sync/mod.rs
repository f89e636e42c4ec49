//! Cross-tab configuration synchronization: store, change bus, polling
//! fallback.

use std::time::Duration;

mod poller;
pub mod store;
pub mod types;

pub use store::{SyncStore, SyncStoreOptions};
pub use types::{ChangeBus, ChangeEvent, LocalChangeBus, SessionPatch, SyncOutcome};

/// Consecutive failed synchronizations tolerated before escalating to
/// polling.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Polling cadence while in the fallback state.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Persisted records older than this are expired and cleared on load.
pub const SESSION_EXPIRY_MS: i64 = 24 * 60 * 60 * 1000;
