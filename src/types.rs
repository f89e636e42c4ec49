//! Core data model: die configuration, session metadata, and the
//! persisted-record envelope shared by every tab of the same user.

use serde::{Deserialize, Serialize};

use crate::{MAX_SIDES, MIN_SIDES};

// ============================================================================
// SelectionMethod
// ============================================================================

/// How the user arrived at the current die: picked from the predefined list
/// or typed a custom side count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Predefined,
    Custom,
}

// ============================================================================
// StorageMedium
// ============================================================================

/// Which persistence backend produced a record.
///
/// Wire names keep the original web storage vocabulary so persisted records
/// stay readable by existing clients: the durable primary medium serializes
/// as `"localStorage"`, the ephemeral fallback as `"sessionStorage"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMedium {
    #[serde(rename = "localStorage")]
    Primary,
    #[serde(rename = "sessionStorage")]
    Fallback,
    #[serde(rename = "unavailable")]
    Unavailable,
}

// ============================================================================
// DiceConfig
// ============================================================================

/// Inclusive probability range `[1, sides]` for a single roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbabilityRange {
    pub min: u32,
    pub max: u32,
}

/// The user-visible die setup.
///
/// `probability_range`, `individual_probability` and `display_format` are
/// derived from `dice_sides`; build through [`DiceConfig::new`] so they
/// never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceConfig {
    pub dice_sides: u32,
    pub selection_method: SelectionMethod,
    pub probability_range: ProbabilityRange,
    pub individual_probability: f64,
    pub display_format: String,
}

impl DiceConfig {
    /// Build a configuration with derived fields computed from `sides`.
    ///
    /// `sides` is assumed domain-valid (`[2, 1000]`); validation happens in
    /// [`crate::validate`] before a config is constructed.
    pub fn new(sides: u32, selection_method: SelectionMethod) -> Self {
        Self {
            dice_sides: sides,
            selection_method,
            probability_range: ProbabilityRange { min: 1, max: sides },
            individual_probability: 1.0 / sides as f64,
            display_format: format!("D{sides}"),
        }
    }

    /// Whether `dice_sides` is inside the supported domain.
    pub fn in_domain(&self) -> bool {
        (MIN_SIDES..=MAX_SIDES).contains(&self.dice_sides)
    }
}

// ============================================================================
// SessionRecord
// ============================================================================

/// Synchronization envelope around a configuration.
///
/// `timestamp` is the sole ordering key for conflict resolution between
/// tabs; `sync_key` identifies the writer (generated fresh per write, not
/// currently read back).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub dice_sides: u32,
    pub selection_method: SelectionMethod,
    /// Write time in epoch milliseconds; strictly increases per tab.
    pub timestamp: i64,
    pub storage_type: StorageMedium,
    pub sync_key: String,
}

// ============================================================================
// Persisted envelope
// ============================================================================

/// Inner `state` object of the persisted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub config: Option<DiceConfig>,
    #[serde(rename = "sessionConfig")]
    pub session_config: Option<SessionRecord>,
}

/// The serialized value stored under the well-known key in the active
/// medium: `{ "state": { "config": …, "sessionConfig": … } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    pub state: PersistedState,
}

impl PersistedEnvelope {
    pub fn new(config: Option<DiceConfig>, session_config: Option<SessionRecord>) -> Self {
        Self {
            state: PersistedState {
                config,
                session_config,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_fields_follow_sides() {
        let config = DiceConfig::new(20, SelectionMethod::Predefined);
        assert_eq!(config.probability_range, ProbabilityRange { min: 1, max: 20 });
        assert_eq!(config.individual_probability, 0.05);
        assert_eq!(config.display_format, "D20");
    }

    #[test]
    fn in_domain_bounds() {
        assert!(DiceConfig::new(2, SelectionMethod::Custom).in_domain());
        assert!(DiceConfig::new(1000, SelectionMethod::Custom).in_domain());
        assert!(!DiceConfig::new(1, SelectionMethod::Custom).in_domain());
        assert!(!DiceConfig::new(1001, SelectionMethod::Custom).in_domain());
    }

    #[test]
    fn config_wire_shape() {
        let config = DiceConfig::new(8, SelectionMethod::Custom);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({
                "diceSides": 8,
                "selectionMethod": "custom",
                "probabilityRange": { "min": 1, "max": 8 },
                "individualProbability": 0.125,
                "displayFormat": "D8"
            })
        );
    }

    #[test]
    fn envelope_wire_shape() {
        let config = DiceConfig::new(6, SelectionMethod::Predefined);
        let session = SessionRecord {
            dice_sides: 6,
            selection_method: SelectionMethod::Predefined,
            timestamp: 1_700_000_000_000,
            storage_type: StorageMedium::Primary,
            sync_key: "abc".to_string(),
        };
        let envelope = PersistedEnvelope::new(Some(config), Some(session));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["state"]["config"]["displayFormat"], json!("D6"));
        assert_eq!(value["state"]["sessionConfig"]["storageType"], json!("localStorage"));
        assert_eq!(value["state"]["sessionConfig"]["syncKey"], json!("abc"));
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = PersistedEnvelope::new(
            Some(DiceConfig::new(12, SelectionMethod::Predefined)),
            Some(SessionRecord {
                dice_sides: 12,
                selection_method: SelectionMethod::Predefined,
                timestamp: 42,
                storage_type: StorageMedium::Fallback,
                sync_key: "k".to_string(),
            }),
        );
        let raw = serde_json::to_string(&envelope).unwrap();
        let reparsed: PersistedEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope, reparsed);
    }

    #[test]
    fn null_state_parses() {
        let raw = r#"{"state":{"config":null,"sessionConfig":null}}"#;
        let envelope: PersistedEnvelope = serde_json::from_str(raw).unwrap();
        assert!(envelope.state.config.is_none());
        assert!(envelope.state.session_config.is_none());
    }
}
