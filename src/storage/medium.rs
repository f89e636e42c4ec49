//! Active-medium selection by sentinel probe.

use tracing::debug;

use crate::types::StorageMedium;

use super::traits::KeyValueBackend;

/// Key written and deleted during a probe. Never holds real data.
const PROBE_KEY: &str = "__dice_config_probe__";
const PROBE_VALUE: &str = "probe";

/// Probe the media in order (primary, then fallback) and return the first
/// one that survives a write + read-verify + delete round trip.
///
/// A medium that errors on any step, or reads back a different value than
/// was written, is treated as unusable. Both failing yields
/// [`StorageMedium::Unavailable`]: the store then runs in-memory only.
pub fn select_active_medium(
    primary: &dyn KeyValueBackend,
    fallback: &dyn KeyValueBackend,
) -> StorageMedium {
    if probe(primary) {
        return StorageMedium::Primary;
    }
    debug!("primary medium failed probe, trying fallback");
    if probe(fallback) {
        return StorageMedium::Fallback;
    }
    debug!("fallback medium failed probe, storage unavailable");
    StorageMedium::Unavailable
}

fn probe(backend: &dyn KeyValueBackend) -> bool {
    if backend.set(PROBE_KEY, PROBE_VALUE).is_err() {
        return false;
    }
    let read_back = match backend.get(PROBE_KEY) {
        Ok(value) => value,
        Err(_) => return false,
    };
    if read_back.as_deref() != Some(PROBE_VALUE) {
        return false;
    }
    backend.remove(PROBE_KEY).is_ok()
}
