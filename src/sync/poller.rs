//! Timer-based polling fallback.
//!
//! Active only while the store's polling flag is set. The loop exits on its
//! own when the flag drops or a newer record is adopted; the owning task
//! handle is additionally aborted by `SyncStore::stop_polling`, so both
//! paths release the timer.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::store::SyncStore;
use super::types::SyncOutcome;

/// Poll the active medium on the store's fixed cadence.
pub(super) async fn poll_loop(store: Arc<SyncStore>) {
    let mut ticker = interval(store.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() yields immediately; swallow the zeroth tick so the first
    // read happens one full period after escalation.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !store.is_polling() {
            break;
        }
        if store.poll_once() == SyncOutcome::Applied {
            debug!("poll tick adopted a newer record");
            break;
        }
    }
}
