use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// Append-only constraint record keyed to a pipeline run & phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub pipeline_run_id: Option<String>,
    pub phase: String,
    pub rule_id: String,
    pub severity: ConstraintSeverity,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintSeverity {
    Info,
    Warn,
    Error,
}

impl Constraint {
    pub fn new(
        pipeline_run_id: Option<String>,
        phase: impl Into<String>,
        rule_id: impl Into<String>,
        severity: ConstraintSeverity,
        description: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            pipeline_run_id,
            phase: phase.into(),
            rule_id: rule_id.into(),
            severity,
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Constraint {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "constraints"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("pipeline_run_id", self.pipeline_run_id.clone().into()),
            ("phase", IndexValue::text(self.phase.clone())),
        ]
    }
}
