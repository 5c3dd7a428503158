use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Complete,
    Failed,
    Interrupted,
    Abandoned,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// One implementation-phase task-graph execution. `graph_file` is the path
/// the task graph was loaded from (for resume/diagnostics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub graph_file: String,
    pub status: SessionStatus,
    pub base_branch: String,
    pub budget_usd: Option<f64>,
    pub total_cost_usd: f64,
    pub planning_cost_usd: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    pub fn new(graph_file: impl Into<String>, base_branch: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            graph_file: graph_file.into(),
            status: SessionStatus::Active,
            base_branch: base_branch.into(),
            budget_usd: None,
            total_cost_usd: 0.0,
            planning_cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_budget(mut self, budget_usd: f64) -> Self {
        self.budget_usd = Some(budget_usd);
        self
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn add_cost(&mut self, cost_usd: f64) {
        self.total_cost_usd += cost_usd;
        self.updated_at = now_ms();
    }

    pub fn over_budget(&self) -> bool {
        matches!(self.budget_usd, Some(budget) if self.total_cost_usd >= budget)
    }
}

impl Record for Session {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "sessions"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![("status", IndexValue::text(self.status.to_string()))]
    }
}
