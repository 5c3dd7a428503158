//! NDJSON event vocabulary for the orchestrator's activity stream (§6).
//!
//! Re-expressed per §9 as a tagged-variant message type rather than a
//! string-keyed, untyped-payload bus: the `event` field and per-variant
//! shape still serialize to exactly the canonical NDJSON names, but
//! producers and subscribers work against a closed `Event` enum instead
//! of matching on strings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "pipeline:start")]
    PipelineStart { session_id: String, run_id: String, pack: String, phases: Vec<String> },
    #[serde(rename = "pipeline:complete")]
    PipelineComplete { session_id: String, run_id: String, status: String, total_cost_usd: f64 },
    #[serde(rename = "pipeline:heartbeat")]
    PipelineHeartbeat { session_id: String, run_id: String },

    #[serde(rename = "story:phase")]
    StoryPhase { session_id: String, phase: String, index: usize, total: usize },
    #[serde(rename = "story:done")]
    StoryDone { session_id: String, phase: String, summary: String },
    #[serde(rename = "story:escalation")]
    StoryEscalation { session_id: String, phase: String, reason: String },
    #[serde(rename = "story:warn")]
    StoryWarn { session_id: String, phase: String, message: String },
    #[serde(rename = "story:log")]
    StoryLog { session_id: String, phase: String, message: String },
    #[serde(rename = "story:stall")]
    StoryStall { session_id: String, phase: String, reason: String },

    #[serde(rename = "status:snapshot")]
    StatusSnapshot {
        session_id: String,
        tasks_pending: usize,
        tasks_running: usize,
        tasks_completed: usize,
        tasks_failed: usize,
        cost_usd: f64,
    },
    #[serde(rename = "cost:recorded")]
    CostRecorded {
        session_id: String,
        task_id: Option<String>,
        provider: String,
        model: String,
        cost_usd: f64,
        savings_usd: f64,
    },

    #[serde(rename = "task:started")]
    TaskStarted { session_id: String, task_id: String, agent: String },
    #[serde(rename = "task:complete")]
    TaskComplete { session_id: String, task_id: String },
    #[serde(rename = "task:failed")]
    TaskFailed { session_id: String, task_id: String, error: String },

    #[serde(rename = "budget:warning")]
    BudgetWarning { session_id: String, current: f64, limit: f64 },
    #[serde(rename = "budget:exceeded")]
    BudgetExceeded { session_id: String, current: f64, limit: f64 },

    #[serde(rename = "worktree:created")]
    WorktreeCreated { session_id: String, task_id: String, path: String },
    #[serde(rename = "worktree:merged")]
    WorktreeMerged { session_id: String, task_id: String },
    #[serde(rename = "worktree:conflict")]
    WorktreeConflict { session_id: String, task_id: String, conflicting_files: Vec<String> },
    #[serde(rename = "worktree:removed")]
    WorktreeRemoved { session_id: String, task_id: String },

    /// Terminal error event for machine-facing consumers (§7 "User-visible
    /// behavior"): carries the error kind and its structured context.
    #[serde(rename = "error")]
    Error { session_id: String, code: String, message: String, context: std::collections::BTreeMap<String, String> },
}

impl Event {
    pub fn session_id(&self) -> &str {
        match self {
            Event::PipelineStart { session_id, .. }
            | Event::PipelineComplete { session_id, .. }
            | Event::PipelineHeartbeat { session_id, .. }
            | Event::StoryPhase { session_id, .. }
            | Event::StoryDone { session_id, .. }
            | Event::StoryEscalation { session_id, .. }
            | Event::StoryWarn { session_id, .. }
            | Event::StoryLog { session_id, .. }
            | Event::StoryStall { session_id, .. }
            | Event::StatusSnapshot { session_id, .. }
            | Event::CostRecorded { session_id, .. }
            | Event::TaskStarted { session_id, .. }
            | Event::TaskComplete { session_id, .. }
            | Event::TaskFailed { session_id, .. }
            | Event::BudgetWarning { session_id, .. }
            | Event::BudgetExceeded { session_id, .. }
            | Event::WorktreeCreated { session_id, .. }
            | Event::WorktreeMerged { session_id, .. }
            | Event::WorktreeConflict { session_id, .. }
            | Event::WorktreeRemoved { session_id, .. }
            | Event::Error { session_id, .. } => session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::PipelineStart { .. } => "pipeline:start",
            Event::PipelineComplete { .. } => "pipeline:complete",
            Event::PipelineHeartbeat { .. } => "pipeline:heartbeat",
            Event::StoryPhase { .. } => "story:phase",
            Event::StoryDone { .. } => "story:done",
            Event::StoryEscalation { .. } => "story:escalation",
            Event::StoryWarn { .. } => "story:warn",
            Event::StoryLog { .. } => "story:log",
            Event::StoryStall { .. } => "story:stall",
            Event::StatusSnapshot { .. } => "status:snapshot",
            Event::CostRecorded { .. } => "cost:recorded",
            Event::TaskStarted { .. } => "task:started",
            Event::TaskComplete { .. } => "task:complete",
            Event::TaskFailed { .. } => "task:failed",
            Event::BudgetWarning { .. } => "budget:warning",
            Event::BudgetExceeded { .. } => "budget:exceeded",
            Event::WorktreeCreated { .. } => "worktree:created",
            Event::WorktreeMerged { .. } => "worktree:merged",
            Event::WorktreeConflict { .. } => "worktree:conflict",
            Event::WorktreeRemoved { .. } => "worktree:removed",
            Event::Error { .. } => "error",
        }
    }
}

/// Wraps an [`Event`] with the `ts` field every NDJSON line carries (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub ts: i64,
    #[serde(flatten)]
    pub event: Event,
}

impl Envelope {
    pub fn new(event: Event) -> Self {
        Self { ts: chrono::Utc::now().timestamp_millis(), event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_canonical_event_name_and_ts() {
        let envelope = Envelope::new(Event::TaskStarted {
            session_id: "s1".to_string(),
            task_id: "t1".to_string(),
            agent: "claude".to_string(),
        });
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event"], "task:started");
        assert!(json["ts"].is_i64());
        assert_eq!(json["task_id"], "t1");
    }

    #[test]
    fn session_id_and_name_accessors_agree_across_variants() {
        let event = Event::BudgetExceeded { session_id: "s2".to_string(), current: 10.0, limit: 5.0 };
        assert_eq!(event.session_id(), "s2");
        assert_eq!(event.name(), "budget:exceeded");
    }
}
