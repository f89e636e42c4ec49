//! Configuration API trait and the in-process reference implementation.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::types::{DiceConfig, SelectionMethod};
use crate::validate::{validate_selection, PRIORITY_FORMAT};
use crate::{DEFAULT_SIDES, PREDEFINED_SIDES};

// ============================================================================
// ConfigApi — the collaborator seam
// ============================================================================

/// The remote configuration endpoint as seen by the UI layer.
///
/// Implementations handle the actual transport (HTTP, in-process, …).
/// `put_configuration` performs server-side validation and returns the
/// stored configuration with recomputed probability fields.
#[async_trait]
pub trait ConfigApi: Send + Sync {
    /// Current configuration; the default die when none was ever stored.
    async fn get_configuration(&self) -> Result<DiceConfig, ApiError>;

    /// Validate and store a new configuration.
    async fn put_configuration(
        &self,
        request: super::types::NewConfigRequest,
    ) -> Result<DiceConfig, ApiError>;

    /// The constant predefined side counts.
    async fn predefined_options(&self) -> Result<Vec<u32>, ApiError>;
}

// ============================================================================
// LocalConfigService
// ============================================================================

/// In-process [`ConfigApi`] implementation.
#[derive(Default)]
pub struct LocalConfigService {
    current: Mutex<Option<DiceConfig>>,
}

impl LocalConfigService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigApi for LocalConfigService {
    async fn get_configuration(&self) -> Result<DiceConfig, ApiError> {
        Ok(self
            .current
            .lock()
            .clone()
            .unwrap_or_else(|| DiceConfig::new(DEFAULT_SIDES, SelectionMethod::Predefined)))
    }

    async fn put_configuration(
        &self,
        request: super::types::NewConfigRequest,
    ) -> Result<DiceConfig, ApiError> {
        let outcome = validate_selection(request.dice_sides, request.selection_method);
        if !outcome.is_valid {
            let priority = outcome.error_priority.unwrap_or(PRIORITY_FORMAT);
            return Err(ApiError::Validation {
                code: if priority == PRIORITY_FORMAT {
                    "invalid_format"
                } else {
                    "out_of_range"
                },
                message: outcome
                    .error_message
                    .unwrap_or_else(|| "Invalid side count".to_string()),
                priority,
            });
        }

        let config = DiceConfig::new(request.dice_sides, request.selection_method);
        *self.current.lock() = Some(config.clone());
        Ok(config)
    }

    async fn predefined_options(&self) -> Result<Vec<u32>, ApiError> {
        Ok(PREDEFINED_SIDES.to_vec())
    }
}

// ============================================================================
// Tests
// ============================================================================
