//! End-to-end tests: several store instances ("tabs") sharing one SQLite
//! medium and one change bus.

use std::sync::Arc;
use std::time::Duration;

use dice_config::storage::{KeyValueBackend, MemoryBackend, SqliteBackend};
use dice_config::{
    ChangeBus, ChangeEvent, DiceConfig, LocalChangeBus, PersistedEnvelope, SelectionMethod,
    SessionRecord, StorageError, StorageMedium, SyncStore, SyncStoreOptions, STORAGE_KEY,
};

// ============================================================================
// Helpers
// ============================================================================

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build a store ("tab") over a shared SQLite file and bus.
fn make_tab(db: &Arc<SqliteBackend>, bus: &Arc<LocalChangeBus>) -> Arc<SyncStore> {
    Arc::new(SyncStore::new(SyncStoreOptions {
        primary: Box::new(Arc::clone(db)),
        fallback: Box::new(MemoryBackend::new()),
        bus: Some(Arc::clone(bus) as Arc<dyn ChangeBus>),
        storage_key: None,
        poll_interval: Some(POLL_INTERVAL),
    }))
}

fn envelope_json(sides: u32, timestamp: i64) -> String {
    let envelope = PersistedEnvelope::new(
        Some(DiceConfig::new(sides, SelectionMethod::Predefined)),
        Some(SessionRecord {
            dice_sides: sides,
            selection_method: SelectionMethod::Predefined,
            timestamp,
            storage_type: StorageMedium::Primary,
            sync_key: format!("remote-{sides}-{timestamp}"),
        }),
    );
    serde_json::to_string(&envelope).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

struct FailingBackend;

impl KeyValueBackend for FailingBackend {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Backend("get failed".to_string()))
    }
    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("set failed".to_string()))
    }
    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Backend("remove failed".to_string()))
    }
}

// ============================================================================
// Notification-driven sync
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_in_one_tab_appears_in_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteBackend::open(dir.path().join("store.db")).unwrap());
    let bus = Arc::new(LocalChangeBus::new());

    let tab_a = make_tab(&db, &bus);
    let tab_b = make_tab(&db, &bus);
    tab_a.load();
    tab_b.load();
    tab_a.attach();
    tab_b.attach();

    tab_b.set_configuration(DiceConfig::new(8, SelectionMethod::Predefined));
    settle().await;

    let adopted = tab_a.configuration().expect("tab A should adopt the write");
    assert_eq!(adopted.dice_sides, 8);
    // The session record travels verbatim, sync key included.
    assert_eq!(
        tab_a.session().unwrap().sync_key,
        tab_b.session().unwrap().sync_key
    );

    tab_a.shutdown();
    tab_b.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn own_echo_does_not_disturb_writer() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteBackend::open(dir.path().join("store.db")).unwrap());
    let bus = Arc::new(LocalChangeBus::new());

    let tab = make_tab(&db, &bus);
    tab.load();
    tab.attach();

    tab.set_configuration(DiceConfig::new(20, SelectionMethod::Predefined));
    let session = tab.session().unwrap();
    settle().await;

    // The echoed notification carries an equal timestamp and is discarded.
    assert_eq!(tab.session().unwrap(), session);
    assert_eq!(tab.failure_count(), 0);

    tab.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_notification_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteBackend::open(dir.path().join("store.db")).unwrap());
    let bus = Arc::new(LocalChangeBus::new());

    let tab = make_tab(&db, &bus);
    tab.load();
    tab.attach();

    tab.set_configuration(DiceConfig::new(20, SelectionMethod::Predefined));
    let local_ts = tab.session().unwrap().timestamp;

    bus.publish(ChangeEvent {
        key: STORAGE_KEY.to_string(),
        old_value: None,
        new_value: Some(envelope_json(4, local_ts - 1000)),
    });
    settle().await;

    assert_eq!(tab.configuration().unwrap().dice_sides, 20);

    bus.publish(ChangeEvent {
        key: STORAGE_KEY.to_string(),
        old_value: None,
        new_value: Some(envelope_json(8, local_ts + 1000)),
    });
    settle().await;

    assert_eq!(tab.configuration().unwrap().dice_sides, 8);

    tab.shutdown();
}

// ============================================================================
// Escalation and polling fallback
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_bad_notifications_escalate_to_polling_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let db = Arc::new(SqliteBackend::open(&path).unwrap());
    let bus = Arc::new(LocalChangeBus::new());

    let tab = make_tab(&db, &bus);
    tab.load();
    tab.attach();

    for _ in 0..3 {
        bus.publish(ChangeEvent {
            key: STORAGE_KEY.to_string(),
            old_value: None,
            new_value: Some("garbage".to_string()),
        });
    }
    settle().await;
    assert_eq!(tab.failure_count(), 3);
    assert!(tab.is_polling());

    // Another process writes a newer record straight to the medium.
    let writer = SqliteBackend::open(&path).unwrap();
    writer
        .set(STORAGE_KEY, &envelope_json(12, now_ms() + 1000))
        .unwrap();

    settle().await;
    assert_eq!(tab.configuration().unwrap().dice_sides, 12);
    // Adoption resets the reliability state machine.
    assert_eq!(tab.failure_count(), 0);
    assert!(!tab.is_polling());

    tab.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_start_does_not_leak_timers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let db = Arc::new(SqliteBackend::open(&path).unwrap());
    let bus = Arc::new(LocalChangeBus::new());

    let tab = make_tab(&db, &bus);
    tab.load();

    tab.record_sync_failure();
    tab.record_sync_failure();
    tab.record_sync_failure();
    tab.start_polling();
    tab.start_polling();
    tab.start_polling();

    // One stop must kill the only timer; a leaked second timer would still
    // adopt the record written below.
    tab.stop_polling();

    let writer = SqliteBackend::open(&path).unwrap();
    writer
        .set(STORAGE_KEY, &envelope_json(12, now_ms() + 1000))
        .unwrap();
    settle().await;

    assert!(tab.configuration().is_none());

    tab.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_skips_ticks_when_unavailable() {
    let tab = Arc::new(SyncStore::new(SyncStoreOptions {
        primary: Box::new(FailingBackend),
        fallback: Box::new(FailingBackend),
        bus: None,
        storage_key: None,
        poll_interval: Some(POLL_INTERVAL),
    }));
    tab.load();
    assert_eq!(tab.active_medium(), StorageMedium::Unavailable);

    tab.record_sync_failure();
    tab.record_sync_failure();
    tab.record_sync_failure();
    tab.start_polling();
    settle().await;

    // Still polling (nothing to reconcile), still no configuration.
    assert!(tab.is_polling());
    assert!(tab.configuration().is_none());

    // The store keeps working in-memory.
    tab.set_configuration(DiceConfig::new(6, SelectionMethod::Predefined));
    assert_eq!(tab.configuration().unwrap().dice_sides, 6);

    tab.shutdown();
}

// ============================================================================
// Load protocol across restarts
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configuration_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let bus = Arc::new(LocalChangeBus::new());

    {
        let db = Arc::new(SqliteBackend::open(&path).unwrap());
        let tab = make_tab(&db, &bus);
        tab.load();
        tab.set_configuration(DiceConfig::new(10, SelectionMethod::Custom));
        tab.shutdown();
    }

    let db = Arc::new(SqliteBackend::open(&path).unwrap());
    let tab = make_tab(&db, &bus);
    tab.load();

    let config = tab.configuration().expect("restored after restart");
    assert_eq!(config.dice_sides, 10);
    assert_eq!(config.selection_method, SelectionMethod::Custom);
    assert_eq!(config.display_format, "D10");

    tab.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn load_rewrites_medium_after_migration() {
    // Record claims it was written to the fallback medium, but the primary
    // probe now succeeds: load must move it over.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    let db = Arc::new(SqliteBackend::open(&path).unwrap());

    let envelope = PersistedEnvelope::new(
        Some(DiceConfig::new(12, SelectionMethod::Predefined)),
        Some(SessionRecord {
            dice_sides: 12,
            selection_method: SelectionMethod::Predefined,
            timestamp: now_ms() - 1000,
            storage_type: StorageMedium::Fallback,
            sync_key: "migrated".to_string(),
        }),
    );
    db.set(STORAGE_KEY, &serde_json::to_string(&envelope).unwrap())
        .unwrap();

    let bus = Arc::new(LocalChangeBus::new());
    let tab = make_tab(&db, &bus);
    tab.load();

    assert_eq!(tab.active_medium(), StorageMedium::Primary);
    assert_eq!(tab.session().unwrap().storage_type, StorageMedium::Primary);

    // The repersisted record carries the corrected medium.
    let raw = db.get(STORAGE_KEY).unwrap().unwrap();
    let stored: PersistedEnvelope = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        stored.state.session_config.unwrap().storage_type,
        StorageMedium::Primary
    );

    tab.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_primary_lands_on_fallback_medium() {
    let fallback = Arc::new(MemoryBackend::new());
    let tab = Arc::new(SyncStore::new(SyncStoreOptions {
        primary: Box::new(FailingBackend),
        fallback: Box::new(Arc::clone(&fallback)),
        bus: None,
        storage_key: None,
        poll_interval: Some(POLL_INTERVAL),
    }));
    tab.load();
    assert_eq!(tab.active_medium(), StorageMedium::Fallback);

    tab.set_configuration(DiceConfig::new(8, SelectionMethod::Predefined));
    assert_eq!(
        tab.session().unwrap().storage_type,
        StorageMedium::Fallback
    );
    assert!(fallback.get(STORAGE_KEY).unwrap().is_some());

    tab.shutdown();
}
