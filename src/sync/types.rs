//! Sync-facing types: the change-notification bus, session patches, and
//! reconciliation outcomes.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::types::{SelectionMethod, StorageMedium};

/// Buffered events per subscription before older ones are dropped.
const BUS_CAPACITY: usize = 16;

// ============================================================================
// ChangeBus — cross-tab notification facility
// ============================================================================

/// A change to the persisted value under a storage key.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Cross-tab change notification facility.
///
/// Models a platform storage-change event: every write to the shared key is
/// published, and every subscribed store instance receives it, including
/// the writer itself. Own echoes carry an equal timestamp and are discarded
/// by the strictly-newer rule.
///
/// This is a capability, not a requirement: a store built without a bus
/// synchronizes through polling alone.
pub trait ChangeBus: Send + Sync {
    /// Subscribe to changes for `key`.
    fn subscribe(&self, key: &str) -> broadcast::Receiver<ChangeEvent>;

    /// Publish a change to all current subscribers of its key.
    fn publish(&self, event: ChangeEvent);
}

/// In-process bus over tokio broadcast channels.
///
/// Connects store instances within one process; tests use it to simulate
/// other tabs.
#[derive(Default)]
pub struct LocalChangeBus {
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl LocalChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, key: &str) -> broadcast::Sender<ChangeEvent> {
        self.channels
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(BUS_CAPACITY).0)
            .clone()
    }
}

impl ChangeBus for LocalChangeBus {
    fn subscribe(&self, key: &str) -> broadcast::Receiver<ChangeEvent> {
        self.sender(key).subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        // Err means no live subscribers; nothing to deliver.
        let _ = self.sender(&event.key).send(event);
    }
}

// ============================================================================
// SessionPatch
// ============================================================================

/// Partial update merged into the session record by
/// [`SyncStore::update_session`](super::SyncStore::update_session).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionPatch {
    pub dice_sides: Option<u32>,
    pub selection_method: Option<SelectionMethod>,
    pub storage_type: Option<StorageMedium>,
}

// ============================================================================
// SyncOutcome
// ============================================================================

/// What a reconciliation attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A strictly newer record was adopted.
    Applied,
    /// Nothing to do: stale, equal, or empty payload.
    Ignored,
    /// The payload failed to parse; counted toward escalation.
    Failed { escalated: bool },
}
