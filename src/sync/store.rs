//! The configuration synchronization store.
//!
//! Single source of truth for the current die configuration in this tab.
//! Copies held by other tabs of the same user are kept consistent through
//! the shared persistence medium: every write lands under one well-known
//! key, change notifications carry the new value to the other tabs, and a
//! timer-based polling fallback takes over after repeated notification
//! failures. Conflicts resolve by timestamp: strictly newer wins.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{select_active_medium, KeyValueBackend};
use crate::types::{DiceConfig, PersistedEnvelope, SessionRecord, StorageMedium};
use crate::STORAGE_KEY;

use super::poller;
use super::types::{ChangeBus, ChangeEvent, SessionPatch, SyncOutcome};
use super::{DEFAULT_POLL_INTERVAL, FAILURE_THRESHOLD, SESSION_EXPIRY_MS};

// ============================================================================
// Options
// ============================================================================

/// Configuration for [`SyncStore`].
pub struct SyncStoreOptions {
    /// Durable medium, probed first (serialized as `localStorage`).
    pub primary: Box<dyn KeyValueBackend>,
    /// Ephemeral medium, probed second (serialized as `sessionStorage`).
    pub fallback: Box<dyn KeyValueBackend>,
    /// Cross-tab change notification facility, when the platform offers
    /// one. Without a bus the store relies on polling alone.
    pub bus: Option<Arc<dyn ChangeBus>>,
    /// Key the envelope is stored under. Defaults to [`crate::STORAGE_KEY`].
    pub storage_key: Option<String>,
    /// Polling cadence for the fallback protocol. Defaults to 2000 ms.
    pub poll_interval: Option<Duration>,
}

// ============================================================================
// SyncState
// ============================================================================

/// Process-wide synchronization state; one instance per store, lifecycle =
/// store lifetime. Config and session record are always set or cleared
/// together.
#[derive(Debug)]
struct SyncState {
    config: Option<DiceConfig>,
    session: Option<SessionRecord>,
    medium: StorageMedium,
    failed_syncs: u32,
    polling: bool,
    /// Highest timestamp written or adopted so far. Local writes go
    /// strictly above it, even when the wall clock stalls.
    last_timestamp: i64,
}

// ============================================================================
// SyncStore
// ============================================================================

/// Cross-tab configuration store. Shareable via `Arc`; every mutation is
/// serialized through one internal mutex, so callbacks, poll ticks and
/// direct calls never observe a half-applied transition.
pub struct SyncStore {
    primary: Box<dyn KeyValueBackend>,
    fallback: Box<dyn KeyValueBackend>,
    bus: Option<Arc<dyn ChangeBus>>,
    storage_key: String,
    poll_interval: Duration,
    state: Mutex<SyncState>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    listen_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncStore {
    pub fn new(options: SyncStoreOptions) -> Self {
        let medium = select_active_medium(options.primary.as_ref(), options.fallback.as_ref());
        Self {
            primary: options.primary,
            fallback: options.fallback,
            bus: options.bus,
            storage_key: options
                .storage_key
                .unwrap_or_else(|| STORAGE_KEY.to_string()),
            poll_interval: options.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            state: Mutex::new(SyncState {
                config: None,
                session: None,
                medium,
                failed_syncs: 0,
                polling: false,
                last_timestamp: 0,
            }),
            poll_task: Mutex::new(None),
            listen_task: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn configuration(&self) -> Option<DiceConfig> {
        self.state.lock().config.clone()
    }

    pub fn session(&self) -> Option<SessionRecord> {
        self.state.lock().session.clone()
    }

    pub fn active_medium(&self) -> StorageMedium {
        self.state.lock().medium
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failed_syncs
    }

    pub fn is_polling(&self) -> bool {
        self.state.lock().polling
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub(super) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    // ------------------------------------------------------------------
    // Load protocol
    // ------------------------------------------------------------------

    /// Restore persisted state. Runs once per tab, before the store is
    /// used.
    ///
    /// An expired record (older than 24 h) is cleared rather than adopted.
    /// After a successful restore the media are re-probed; when the active
    /// medium changed since the record was written, both the cached medium
    /// and the record's `storage_type` are updated and the record
    /// repersisted.
    pub fn load(&self) {
        let Some(envelope) = self.read_persisted() else {
            self.select_active_storage_medium();
            return;
        };
        let (Some(config), Some(session)) =
            (envelope.state.config, envelope.state.session_config)
        else {
            self.select_active_storage_medium();
            return;
        };

        if now_ms() - session.timestamp > SESSION_EXPIRY_MS {
            debug!(timestamp = session.timestamp, "persisted session expired, clearing");
            self.clear();
            return;
        }

        let probed = select_active_medium(self.primary.as_ref(), self.fallback.as_ref());
        let mut session = session;
        let moved = session.storage_type != probed;
        if moved {
            debug!(?probed, "storage medium changed since last write");
            session.storage_type = probed;
        }

        let mut state = self.state.lock();
        state.medium = probed;
        state.last_timestamp = state.last_timestamp.max(session.timestamp);
        state.config = Some(config);
        state.session = Some(session);
        if moved {
            self.persist_locked(&state);
        }
    }

    /// Read the envelope from whichever medium holds it, primary first.
    fn read_persisted(&self) -> Option<PersistedEnvelope> {
        for backend in [self.primary.as_ref(), self.fallback.as_ref()] {
            match backend.get(&self.storage_key) {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(envelope) => return Some(envelope),
                    Err(e) => warn!(error = %e, "ignoring malformed persisted record"),
                },
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to read persisted record"),
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Replace the current configuration.
    ///
    /// Builds a fresh session record (monotonic timestamp, new sync key,
    /// the active medium), replaces both halves of the state in a single
    /// transition, and writes the envelope to the active medium. Input is
    /// assumed pre-validated by the caller.
    pub fn set_configuration(&self, config: DiceConfig) {
        let mut state = self.state.lock();
        let timestamp = next_timestamp(&mut state);
        let session = SessionRecord {
            dice_sides: config.dice_sides,
            selection_method: config.selection_method,
            timestamp,
            storage_type: state.medium,
            sync_key: Uuid::new_v4().to_string(),
        };
        state.config = Some(config);
        state.session = Some(session);
        self.persist_locked(&state);
    }

    /// Merge partial fields into the session record and refresh its
    /// timestamp. No-op when no session record exists yet.
    pub fn update_session(&self, patch: SessionPatch) {
        let mut state = self.state.lock();
        let Some(mut session) = state.session.clone() else {
            return;
        };
        if let Some(sides) = patch.dice_sides {
            session.dice_sides = sides;
        }
        if let Some(method) = patch.selection_method {
            session.selection_method = method;
        }
        if let Some(storage) = patch.storage_type {
            session.storage_type = storage;
        }
        session.timestamp = next_timestamp(&mut state);
        state.session = Some(session);
        self.persist_locked(&state);
    }

    /// Count a failed synchronization. The third consecutive failure flips
    /// polling-active; returns `true` on exactly that transition.
    pub fn record_sync_failure(&self) -> bool {
        let mut state = self.state.lock();
        state.failed_syncs += 1;
        let escalate = state.failed_syncs >= FAILURE_THRESHOLD && !state.polling;
        if escalate {
            debug!(failures = state.failed_syncs, "escalating to polling fallback");
            state.polling = true;
        }
        escalate
    }

    /// Clear the failure counter and leave polling mode. Called whenever a
    /// reconciliation succeeds through any path.
    pub fn reset_sync_success(&self) {
        {
            let mut state = self.state.lock();
            state.failed_syncs = 0;
            state.polling = false;
        }
        self.stop_polling();
    }

    /// Wipe configuration, session record, failure counter and polling
    /// flag, and delete the persisted key from both media.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.config = None;
            state.session = None;
            state.failed_syncs = 0;
            state.polling = false;
        }
        self.stop_polling();

        let mut old_value = None;
        for backend in [self.primary.as_ref(), self.fallback.as_ref()] {
            if old_value.is_none() {
                old_value = backend.get(&self.storage_key).unwrap_or_default();
            }
            if let Err(e) = backend.remove(&self.storage_key) {
                warn!(error = %e, "failed to clear persisted configuration");
            }
        }
        if old_value.is_some() {
            self.publish(old_value, None);
        }
    }

    /// Re-probe the media and cache the winner as the active medium.
    pub fn select_active_storage_medium(&self) -> StorageMedium {
        let medium = select_active_medium(self.primary.as_ref(), self.fallback.as_ref());
        self.state.lock().medium = medium;
        medium
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// React to a cross-tab change notification for the configuration key.
    ///
    /// A parse failure counts toward the escalation threshold; a stale or
    /// equal timestamp is discarded; a strictly newer record is adopted and
    /// resets the failure state.
    pub fn handle_change_payload(&self, new_value: Option<&str>) -> SyncOutcome {
        let Some(raw) = new_value else {
            // Another tab cleared its record; nothing to adopt.
            return SyncOutcome::Ignored;
        };
        let envelope: PersistedEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed change notification");
                return SyncOutcome::Failed {
                    escalated: self.record_sync_failure(),
                };
            }
        };
        if self.reconcile(envelope) {
            self.reset_sync_success();
            SyncOutcome::Applied
        } else {
            SyncOutcome::Ignored
        }
    }

    /// One polling tick: read the persisted record from the active medium
    /// and apply the strictly-newer rule. Read or parse errors skip the
    /// tick without touching the failure counter; polling is already the
    /// degraded mode. An unavailable medium makes the tick a no-op.
    pub fn poll_once(&self) -> SyncOutcome {
        let medium = self.active_medium();
        let Some(backend) = self.backend_for(medium) else {
            return SyncOutcome::Ignored;
        };
        let raw = match backend.get(&self.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SyncOutcome::Ignored,
            Err(e) => {
                warn!(error = %e, "poll read failed, skipping tick");
                return SyncOutcome::Ignored;
            }
        };
        let envelope: PersistedEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "poll parse failed, skipping tick");
                return SyncOutcome::Ignored;
            }
        };
        if self.reconcile(envelope) {
            self.reset_sync_success();
            SyncOutcome::Applied
        } else {
            SyncOutcome::Ignored
        }
    }

    /// Adopt the incoming record iff its timestamp is strictly greater
    /// than the current one.
    ///
    /// The incoming session record is installed as-is, timestamp included,
    /// which makes re-delivery of the same record a no-op.
    fn reconcile(&self, envelope: PersistedEnvelope) -> bool {
        let (Some(config), Some(session)) =
            (envelope.state.config, envelope.state.session_config)
        else {
            return false;
        };
        let mut state = self.state.lock();
        let current = state
            .session
            .as_ref()
            .map(|s| s.timestamp)
            .unwrap_or(i64::MIN);
        if session.timestamp <= current {
            debug!(
                incoming = session.timestamp,
                current, "discarding stale update"
            );
            return false;
        }
        state.last_timestamp = state.last_timestamp.max(session.timestamp);
        state.config = Some(config);
        state.session = Some(session);
        true
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Subscribe to the change bus and handle notifications until
    /// [`shutdown`](Self::shutdown). No-op when the store was built
    /// without a bus or is already listening.
    pub fn attach(self: &Arc<Self>) {
        let Some(bus) = &self.bus else {
            return;
        };
        let mut task = self.listen_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let mut rx = bus.subscribe(&self.storage_key);
        let store = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.key != store.storage_key {
                            continue;
                        }
                        let outcome = store.handle_change_payload(event.new_value.as_deref());
                        if let SyncOutcome::Failed { escalated: true } = outcome {
                            store.start_polling();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Start the polling fallback task. At most one timer is ever active;
    /// a live handle short-circuits the start.
    pub fn start_polling(self: &Arc<Self>) {
        let mut task = self.poll_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let store = Arc::clone(self);
        *task = Some(tokio::spawn(poller::poll_loop(store)));
    }

    /// Cancel the polling task, if one is active. The handle is taken
    /// before aborting, so the timer is cleared exactly once.
    pub fn stop_polling(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }
    }

    /// Tear down the listener and polling tasks. The store itself stays
    /// usable for direct calls afterwards.
    pub fn shutdown(&self) {
        self.stop_polling();
        if let Some(handle) = self.listen_task.lock().take() {
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the current state to the active medium and notify the
    /// bus. Persistence failures degrade silently: the in-memory state
    /// stays authoritative for this tab.
    fn persist_locked(&self, state: &SyncState) {
        let Some(backend) = self.backend_for(state.medium) else {
            // Single-tab mode: no medium, nothing to share.
            return;
        };
        let envelope = PersistedEnvelope::new(state.config.clone(), state.session.clone());
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize envelope");
                return;
            }
        };
        let old_value = backend.get(&self.storage_key).unwrap_or_default();
        if let Err(e) = backend.set(&self.storage_key, &raw) {
            warn!(error = %e, "failed to persist configuration");
            return;
        }
        self.publish(old_value, Some(raw));
    }

    fn publish(&self, old_value: Option<String>, new_value: Option<String>) {
        if let Some(bus) = &self.bus {
            bus.publish(ChangeEvent {
                key: self.storage_key.clone(),
                old_value,
                new_value,
            });
        }
    }

    fn backend_for(&self, medium: StorageMedium) -> Option<&dyn KeyValueBackend> {
        match medium {
            StorageMedium::Primary => Some(self.primary.as_ref()),
            StorageMedium::Fallback => Some(self.fallback.as_ref()),
            StorageMedium::Unavailable => None,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next local write timestamp: wall clock, bumped past the highest
/// timestamp seen so far so writes from this tab strictly increase.
fn next_timestamp(state: &mut SyncState) -> i64 {
    let timestamp = now_ms().max(state.last_timestamp + 1);
    state.last_timestamp = timestamp;
    timestamp
}

// ============================================================================
// Tests
// ============================================================================
