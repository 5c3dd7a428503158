use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSeverity {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRule {
    pub rule_id: String,
    pub severity: ConstraintSeverity,
    pub description: String,
}

/// A named, ordered pipeline phase as the pack declares it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    pub name: String,
    pub order: u32,
}
