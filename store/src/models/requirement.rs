use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// Append-only requirement record keyed to a pipeline run & phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub pipeline_run_id: Option<String>,
    pub phase: String,
    pub kind: RequirementKind,
    pub text: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Functional,
    NonFunctional,
}

impl Requirement {
    pub fn new(
        pipeline_run_id: Option<String>,
        phase: impl Into<String>,
        kind: RequirementKind,
        text: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            pipeline_run_id,
            phase: phase.into(),
            kind,
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Requirement {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "requirements"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("pipeline_run_id", self.pipeline_run_id.clone().into()),
            ("phase", IndexValue::text(self.phase.clone())),
        ]
    }
}
