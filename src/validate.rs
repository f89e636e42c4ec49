//! Side-count validation, shared by the client form and the configuration
//! API.
//!
//! Two error priorities: format problems (non-integer input) report as
//! priority 1, presence and range problems as priority 2. A decimal like
//! `"12.5"` is a format error even though it is numeric.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::SelectionMethod;
use crate::{MAX_SIDES, MIN_SIDES, PREDEFINED_SIDES};

/// Format errors: non-integer, decimal.
pub const PRIORITY_FORMAT: u8 = 1;
/// Presence and range errors.
pub const PRIORITY_RANGE: u8 = 2;

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid integer pattern"));

// ============================================================================
// ValidationOutcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

/// Structured validation result; never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_priority: Option<u8>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            status: ValidationStatus::Valid,
            error_message: None,
            error_priority: None,
        }
    }

    pub fn invalid(priority: u8, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            status: ValidationStatus::Invalid,
            error_message: Some(message.into()),
            error_priority: Some(priority),
        }
    }
}

// ============================================================================
// Validators
// ============================================================================

/// Validate a structured selection: side count in `[2, 1000]`, and for the
/// predefined method the count must be one of the predefined dice.
pub fn validate_selection(dice_sides: u32, selection_method: SelectionMethod) -> ValidationOutcome {
    if !(MIN_SIDES..=MAX_SIDES).contains(&dice_sides) {
        return ValidationOutcome::invalid(
            PRIORITY_RANGE,
            format!("Side count must be between {MIN_SIDES} and {MAX_SIDES}"),
        );
    }
    if selection_method == SelectionMethod::Predefined && !PREDEFINED_SIDES.contains(&dice_sides) {
        return ValidationOutcome::invalid(
            PRIORITY_RANGE,
            format!("{dice_sides} is not a predefined die"),
        );
    }
    ValidationOutcome::valid()
}

/// Validate raw custom-side input as typed by the user.
///
/// Empty input is a presence error; anything that is not a plain integer
/// (decimals included) is a format error; an integer outside `[2, 1000]`
/// is a range error.
pub fn validate_custom_sides(raw: &str) -> ValidationOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ValidationOutcome::invalid(PRIORITY_RANGE, "A side count is required");
    }
    if !INTEGER_RE.is_match(trimmed) {
        return ValidationOutcome::invalid(PRIORITY_FORMAT, "Side count must be a whole number");
    }
    // Out-of-range covers integers too large to parse.
    let sides = match trimmed.parse::<i64>() {
        Ok(sides) => sides,
        Err(_) => {
            return ValidationOutcome::invalid(
                PRIORITY_RANGE,
                format!("Side count must be between {MIN_SIDES} and {MAX_SIDES}"),
            );
        }
    };
    if sides < MIN_SIDES as i64 || sides > MAX_SIDES as i64 {
        return ValidationOutcome::invalid(
            PRIORITY_RANGE,
            format!("Side count must be between {MIN_SIDES} and {MAX_SIDES}"),
        );
    }
    ValidationOutcome::valid()
}

// ============================================================================
// Tests
// ============================================================================
