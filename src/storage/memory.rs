//! In-memory key-value store — the ephemeral fallback medium.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::StorageError;

use super::traits::KeyValueBackend;

/// Process-local backend. Data lives as long as the backend does, which
/// mirrors session-scoped storage: it survives store reloads within one
/// process but never crosses a restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
