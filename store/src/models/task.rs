use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// Lifecycle status of a [`Task`] inside a session's task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Blocked,
}

impl TaskStatus {
    /// A dependency in one of these statuses satisfies a dependent's
    /// `depends_on` entry (§3, §8 invariant 1 & 3).
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    Subscription,
    Api,
}

/// A single unit of work in a session's task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub agent: Option<String>,
    pub model: Option<String>,
    pub billing_mode: Option<BillingMode>,
    pub worktree_path: Option<String>,
    pub worktree_branch: Option<String>,
    pub worker_id: Option<String>,
    pub budget_usd: Option<f64>,
    pub cost_usd: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub task_type: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn new(id: impl Into<String>, session_id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            name: name.into(),
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            agent: None,
            model: None,
            billing_mode: None,
            worktree_path: None,
            worktree_branch: None,
            worker_id: None,
            budget_usd: None,
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            result: None,
            error: None,
            exit_code: None,
            retry_count: 0,
            max_retries: 0,
            task_type: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_budget(mut self, budget_usd: f64) -> Self {
        self.budget_usd = Some(budget_usd);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn mark_running(&mut self, worker_id: impl Into<String>) {
        self.status = TaskStatus::Running;
        self.worker_id = Some(worker_id.into());
        self.started_at = Some(now_ms());
        self.updated_at = now_ms();
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.exit_code = Some(0);
        self.error = None;
        self.worker_id = None;
        self.completed_at = Some(now_ms());
        self.updated_at = now_ms();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, exit_code: Option<i32>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.exit_code = exit_code;
        self.worker_id = None;
        self.completed_at = Some(now_ms());
        self.updated_at = now_ms();
    }

    /// Re-queue for another attempt after a worker failure, per §4.J step 3.
    pub fn retry_or_fail(&mut self) -> bool {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = TaskStatus::Pending;
            self.worker_id = None;
            self.updated_at = now_ms();
            true
        } else {
            self.mark_failed("retries exhausted", None);
            false
        }
    }

    pub fn add_usage(&mut self, input_tokens: i64, output_tokens: i64, cost_usd: f64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.cost_usd += cost_usd;
        self.updated_at = now_ms();
    }

    pub fn is_ready(&self, dependency_statuses: &[TaskStatus]) -> bool {
        self.status == TaskStatus::Pending && dependency_statuses.iter().all(|s| s.satisfies_dependency())
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "tasks"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("session_id", IndexValue::text(self.session_id.clone())),
            ("status", IndexValue::text(self.status.to_string())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_or_fail_retries_until_exhausted() {
        let mut task = Task::new("t1", "s1", "build", "do the thing").with_max_retries(2);
        task.set_status(TaskStatus::Running);
        assert!(task.retry_or_fail());
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.status, TaskStatus::Pending);

        task.set_status(TaskStatus::Running);
        assert!(task.retry_or_fail());
        assert_eq!(task.retry_count, 2);

        task.set_status(TaskStatus::Running);
        assert!(!task.retry_or_fail());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn ready_requires_all_dependencies_terminal_ok() {
        let task = Task::new("t2", "s1", "deploy", "do it").with_depends_on(vec!["t1".into()]);
        assert!(!task.is_ready(&[TaskStatus::Running]));
        assert!(task.is_ready(&[TaskStatus::Completed]));
        assert!(task.is_ready(&[TaskStatus::Cancelled]));
    }
}
