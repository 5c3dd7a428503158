use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// Status of a [`PipelineRun`]. Advances monotonically as phases complete;
/// never reverts except via a fresh child run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineRunStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for PipelineRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineRunStatus::Running => "running",
            PipelineRunStatus::Paused => "paused",
            PipelineRunStatus::Completed => "completed",
            PipelineRunStatus::Failed => "failed",
            PipelineRunStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One end-to-end execution of the phase state machine.
///
/// A child run references its parent via `parent_run_id` for amendments;
/// the reverse edge never exists (parents do not track children).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub methodology: String,
    pub current_phase: Option<String>,
    pub status: PipelineRunStatus,
    pub config_snapshot: serde_json::Value,
    pub token_usage_snapshot: serde_json::Value,
    pub parent_run_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PipelineRun {
    pub fn new(methodology: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            methodology: methodology.into(),
            current_phase: None,
            status: PipelineRunStatus::Running,
            config_snapshot: serde_json::json!({}),
            token_usage_snapshot: serde_json::json!({}),
            parent_run_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(parent_run_id.into());
        self
    }

    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.current_phase = Some(phase.into());
        self.updated_at = now_ms();
    }

    pub fn set_status(&mut self, status: PipelineRunStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn is_amendment(&self) -> bool {
        self.parent_run_id.is_some()
    }
}

impl Record for PipelineRun {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "pipeline_runs"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("status", IndexValue::text(self.status.to_string())),
            ("parent_run_id", self.parent_run_id.clone().into()),
            ("current_phase", self.current_phase.clone().into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amendment_run_tracks_parent_not_reverse() {
        let parent = PipelineRun::new("substrate");
        let child = PipelineRun::new("substrate").with_parent(parent.id.clone());
        assert!(child.is_amendment());
        assert_eq!(child.parent_run_id.as_deref(), Some(parent.id.as_str()));
    }
}
