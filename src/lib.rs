//! Local-first die configuration store.
//!
//! A user's die setup (side count + how it was chosen) is persisted to the
//! best available local medium and kept consistent across tabs of the same
//! user through change notifications, with a timer-based polling fallback
//! once notifications prove unreliable. Conflicts between tabs resolve by
//! write timestamp: strictly newer wins.
//!
//! The crate is built around four seams:
//! - [`sync::SyncStore`] — the per-tab synchronization store
//! - [`storage::KeyValueBackend`] — pluggable persistence media
//! - [`sync::ChangeBus`] — the cross-tab notification capability
//! - [`api::ConfigApi`] — the remote configuration collaborator

pub mod api;
pub mod error;
pub mod storage;
pub mod sync;
pub mod types;
pub mod validate;

pub use error::{ApiError, ConfigStoreError, Result, StorageError};
pub use sync::{ChangeBus, ChangeEvent, LocalChangeBus, SessionPatch, SyncOutcome, SyncStore, SyncStoreOptions};
pub use types::{
    DiceConfig, PersistedEnvelope, PersistedState, ProbabilityRange, SelectionMethod,
    SessionRecord, StorageMedium,
};

/// Well-known key the persisted envelope is stored under.
pub const STORAGE_KEY: &str = "dice-roller-config";

/// Smallest supported side count.
pub const MIN_SIDES: u32 = 2;

/// Largest supported side count.
pub const MAX_SIDES: u32 = 1000;

/// Side counts offered as predefined dice.
pub const PREDEFINED_SIDES: [u32; 6] = [4, 6, 8, 10, 12, 20];

/// Side count of the default die.
pub const DEFAULT_SIDES: u32 = 6;
