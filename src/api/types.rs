use serde::{Deserialize, Serialize};

use crate::types::SelectionMethod;

/// Body of a configuration update. Derived probability fields are never
/// accepted from the caller; the service recomputes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfigRequest {
    pub dice_sides: u32,
    pub selection_method: SelectionMethod,
}
