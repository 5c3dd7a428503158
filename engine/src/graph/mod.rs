//! Task-Graph Engine (§4.J): parses a task graph file, validates it, then
//! walks the DAG in topological waves, dispatching ready tasks to the
//! worker pool and applying gates/merge/retry on completion.

pub mod file_format;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use substrate_store::models::{BillingMode, CostEntry, Session, Task, TaskStatus};
use substrate_store::Store;
use tracing::{debug, info, warn};

use crate::cost::{self, RateTable};
use crate::dispatcher::extract_last_yaml_block;
use crate::error::{CoreError, Result};
use crate::gate::{ac_validation, code_review_verdict, test_coverage, Action, Gate, GatePipeline};
use crate::pool::{WorkOutcome, WorkRequest, WorkerPool};
use crate::worktree::WorktreeManager;

/// The default post-task gate pipeline (§4.J step 3, §4.G "Registered gate
/// kinds") run against every completed implementation task's structured
/// output before it is eligible to merge. A task's own `max_retries`
/// bounds each gate, so a task configured for zero retries fails closed
/// on the first bad gate rather than silently warning.
fn default_gate_pipeline(max_retries: u32) -> GatePipeline {
    GatePipeline::new(vec![
        Gate::new("ac-validation", max_retries, ac_validation()),
        Gate::new("test-coverage", max_retries, test_coverage()),
        Gate::new("code-review-verdict", max_retries, code_review_verdict()),
    ])
}

/// Extracts and parses the trailing YAML block from a worker's stdout, the
/// same structured-output contract the Sub-Agent Dispatcher enforces for
/// phase-level agent calls (§4.F).
fn parse_structured_output(stdout: &str) -> Option<Value> {
    let yaml_text = extract_last_yaml_block(stdout)?;
    serde_yaml::from_str(&yaml_text).ok()
}

pub use file_format::{SessionDef, TaskDef, TaskGraphFile};

/// Materializes a validated [`TaskGraphFile`] into the store: one
/// [`Session`] row, one [`Task`] row per entry, and one
/// `task_dependencies` row per `depends_on` edge (§4.J, §6 "task graph
/// file"). Callers must run [`validate::validate_no_cycles`] and
/// [`validate::validate_no_dangling_references`] first; this function
/// trusts the graph and only guards against a self-dependency, which
/// the DB layer also rejects.
///
/// `dependencies_of`/`dependents_of`/`ready_tasks` all read the
/// `task_dependencies` join table, not `Task::depends_on` — both are
/// populated here so the task stays self-describing, but the engine's
/// readiness check is driven entirely by the join table.
pub fn load_into_store(store: &Store, graph: &TaskGraphFile, base_branch: &str) -> Result<Session> {
    let mut session = Session::new(graph.session.name.clone(), base_branch.to_string());
    if let Some(budget_usd) = graph.session.budget_usd {
        session = session.with_budget(budget_usd);
    }
    store.insert(&session)?;

    for (task_id, def) in &graph.tasks {
        let mut task = Task::new(task_id.clone(), session.id.clone(), def.name.clone(), def.prompt.clone())
            .with_depends_on(def.depends_on.clone());
        task.task_type = def.task_type.clone();
        task.model = def.model.clone();
        if let Some(agent) = &def.agent {
            task = task.with_agent(agent.clone());
        }
        if let Some(budget_usd) = def.budget_usd {
            task = task.with_budget(budget_usd);
        }
        if let Some(max_retries) = def.max_retries {
            task = task.with_max_retries(max_retries);
        }
        store.insert(&task)?;
    }

    for (task_id, def) in &graph.tasks {
        for dep_id in &def.depends_on {
            if dep_id == task_id {
                return Err(CoreError::TaskGraph(format!("task '{task_id}' cannot depend on itself")));
            }
            store.add_dependency(task_id, dep_id)?;
        }
    }

    info!(session_id = %session.id, tasks = graph.tasks.len(), "load_into_store: materialized task graph");
    Ok(session)
}

/// Orders the ready set by (a) fewer remaining dependents, (b)
/// lexicographic task id (§4.J "Determinism"). A deterministic mode that
/// sorts by id alone is available via [`order_ready_set_by_id`].
pub fn order_ready_set(store: &Store, mut ready: Vec<Task>) -> Result<Vec<Task>> {
    let mut with_counts: Vec<(usize, Task)> = Vec::with_capacity(ready.len());
    for task in ready.drain(..) {
        let dependents = store.dependents_of(&task.id)?;
        with_counts.push((dependents.len(), task));
    }
    with_counts.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    Ok(with_counts.into_iter().map(|(_, t)| t).collect())
}

pub fn order_ready_set_by_id(mut ready: Vec<Task>) -> Vec<Task> {
    ready.sort_by(|a, b| a.id.cmp(&b.id));
    ready
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// All tasks reached a terminal state.
    Finished,
    /// Session was paused or cancelled mid-run.
    Halted,
    /// Still has work; call `tick` again.
    InProgress,
}

/// Drives one session's task graph through the worker pool. Holds the
/// handles the Phase Orchestrator hands it (`store`, `pack`, worktree
/// manager, rate table) plus its own bounded pool.
pub struct TaskGraphEngine {
    store: Arc<Store>,
    pool: Arc<WorkerPool>,
    worktree: Arc<WorktreeManager>,
    rates: RateTable,
    agent_binary_for: fn(&str) -> String,
}

impl TaskGraphEngine {
    pub fn new(store: Arc<Store>, pool: Arc<WorkerPool>, worktree: Arc<WorktreeManager>, rates: RateTable) -> Self {
        Self { store, pool, worktree, rates, agent_binary_for: |agent| agent.to_string() }
    }

    /// One engine tick (§4.J "Execution"):
    /// 1. exit if paused/cancelled, finish if all terminal;
    /// 2. drain the ready set into free pool slots;
    /// 3. (awaited separately via `collect_outcomes`) apply gate/merge/retry;
    /// 4. enforce the session budget.
    pub async fn tick(&self, session_id: &str, session_budget_usd: Option<f64>) -> Result<TickOutcome> {
        if self.is_signaled_to_halt(session_id)? {
            return Ok(TickOutcome::Halted);
        }

        let all_tasks: Vec<Task> = self.store.query(&substrate_store::Filter::new().eq("session_id", session_id))?;
        if all_tasks.iter().all(|t| t.status.is_terminal()) {
            return Ok(TickOutcome::Finished);
        }

        let current_cost = substrate_store::views::session_cost_summary(&self.store, session_id)?.total_cost_usd;
        if cost::check_budget(session_budget_usd, current_cost).is_err() {
            warn!(session_id, current_cost, "budget exceeded, refusing to dispatch further tasks");
            return Ok(TickOutcome::InProgress);
        }

        let ready = substrate_store::views::ready_tasks(&self.store, session_id)?;
        let ordered = order_ready_set(&self.store, ready)?;

        for mut task in ordered {
            if self.pool.available() == 0 {
                break;
            }
            self.dispatch_task(&mut task).await?;
        }

        Ok(TickOutcome::InProgress)
    }

    async fn dispatch_task(&self, task: &mut Task) -> Result<()> {
        let worktree_info = self.worktree.create_worktree(&task.id, None).await.map_err(|e| CoreError::Git(e.to_string()))?;
        task.worktree_path = Some(worktree_info.path.to_string_lossy().to_string());
        task.worktree_branch = Some(worktree_info.branch.clone());
        task.mark_running("pool");
        self.store.update(task)?;

        let agent = task.agent.clone().unwrap_or_else(|| "claude".to_string());
        let binary = (self.agent_binary_for)(&agent);
        let timeout = Duration::from_millis(task.budget_usd.map(|_| 600_000).unwrap_or(600_000));

        self.pool
            .spawn(WorkRequest {
                worker_id: task.id.clone(),
                binary,
                args: vec![],
                stdin: task.prompt.clone(),
                env: Default::default(),
                cwd: Some(worktree_info.path),
                timeout,
            })
            .await;

        debug!(task_id = %task.id, "dispatch_task: dispatched to pool");
        Ok(())
    }

    /// Drains pending worker outcomes and applies the post-task policy
    /// (§4.J step 3): on success runs gates then merges; on failure
    /// retries within budget or marks failed.
    pub async fn collect_outcomes(&self, outcomes: &mut tokio::sync::mpsc::UnboundedReceiver<WorkOutcome>) -> Result<()> {
        while let Ok(outcome) = outcomes.try_recv() {
            match outcome {
                WorkOutcome::Complete { worker_id, stdout, .. } => {
                    self.on_task_success(&worker_id, &stdout).await?;
                }
                WorkOutcome::Error { worker_id, stderr, .. } => {
                    self.on_task_failure(&worker_id, &stderr)?;
                }
            }
        }
        Ok(())
    }

    async fn on_task_success(&self, task_id: &str, stdout: &str) -> Result<()> {
        let mut task = self.store.get_required::<Task>(task_id)?;
        let tokens = cost::estimate_tokens(stdout);
        let model = task.model.clone().unwrap_or_default();
        let agent = task.agent.clone().unwrap_or_default();
        let cost_usd = cost::estimate_cost_safe(&self.rates, &agent, &model, 0, tokens);
        task.add_usage(0, tokens as i64, cost_usd);

        let billing_mode = task.billing_mode.unwrap_or(BillingMode::Api);
        let cost_entry = CostEntry::new(task.session_id.clone(), Some(task.id.clone()), &agent, &agent, &model, billing_mode, 0, tokens as i64, cost_usd);
        self.store.insert(&cost_entry)?;
        substrate_store::views::reconcile_session_total_cost(&self.store, &task.session_id)?;

        let parsed = parse_structured_output(stdout);
        let gate_input = parsed.clone().unwrap_or(Value::Null);
        let mut gates = default_gate_pipeline(task.max_retries);
        let gate_result = gates.run(&gate_input);

        match gate_result.action {
            Action::Proceed => match self.worktree.merge_worktree(task_id, None).await {
                Ok(merge) if merge.success => {
                    task.mark_completed(parsed.unwrap_or_else(|| serde_json::json!({"stdout": stdout})));
                    self.store.update(&task)?;
                    info!(task_id, "task completed and merged");
                }
                Ok(_merge) => {
                    task.set_status(TaskStatus::Blocked);
                    self.store.update(&task)?;
                    warn!(task_id, "merge produced conflicts, task blocked for human intervention");
                }
                Err(e) => {
                    task.mark_failed(e.to_string(), None);
                    self.store.update(&task)?;
                }
            },
            Action::Retry => {
                let retried = task.retry_or_fail();
                self.store.update(&task)?;
                if retried {
                    warn!(task_id, issues = ?gate_result.issues, "post-task gate failed, retrying");
                } else {
                    warn!(task_id, issues = ?gate_result.issues, "post-task gate failed, retries exhausted");
                }
            }
            Action::Warn | Action::Escalate => {
                task.error = Some(gate_result.issues.iter().map(|i| i.message.clone()).collect::<Vec<_>>().join("; "));
                task.set_status(TaskStatus::Blocked);
                self.store.update(&task)?;
                warn!(task_id, issues = ?gate_result.issues, "post-task gate exhausted retries, task blocked for human intervention");
            }
        }
        Ok(())
    }

    fn on_task_failure(&self, task_id: &str, stderr: &str) -> Result<()> {
        let mut task = self.store.get_required::<Task>(task_id)?;
        let retried = task.retry_or_fail();
        if !retried {
            task.error = Some(stderr.to_string());
        }
        self.store.update(&task)?;
        if retried {
            debug!(task_id, "task failed, retrying");
        } else {
            warn!(task_id, "task failed, retries exhausted");
        }
        Ok(())
    }

    fn is_signaled_to_halt(&self, session_id: &str) -> Result<bool> {
        use substrate_store::models::SessionStatus;
        let session = self.store.get_required::<Session>(session_id)?;
        Ok(matches!(session.status, SessionStatus::Paused | SessionStatus::Abandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ready_set_by_id_is_lexicographic() {
        let a = Task::new("b", "s", "b", "do b");
        let b = Task::new("a", "s", "a", "do a");
        let ordered = order_ready_set_by_id(vec![a, b]);
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }

    fn sample_graph() -> TaskGraphFile {
        let yaml = r#"
version: "1"
session:
  name: demo
  budget_usd: 10.0
tasks:
  a:
    name: Task A
    prompt: do a thing
  b:
    name: Task B
    prompt: do another thing
    depends_on: [a]
"#;
        file_format::parse_graph_text(yaml, Some("yaml")).unwrap()
    }

    #[test]
    fn load_into_store_creates_session_and_tasks() {
        let store = Store::open_in_memory().unwrap();
        let graph = sample_graph();
        let session = load_into_store(&store, &graph, "main").unwrap();

        assert_eq!(session.base_branch, "main");
        assert_eq!(session.budget_usd, Some(10.0));

        let task_a = store.get_required::<Task>("a").unwrap();
        let task_b = store.get_required::<Task>("b").unwrap();
        assert_eq!(task_a.session_id, session.id);
        assert_eq!(task_b.session_id, session.id);
    }

    #[test]
    fn load_into_store_populates_dependency_join_table() {
        let store = Store::open_in_memory().unwrap();
        let graph = sample_graph();
        load_into_store(&store, &graph, "main").unwrap();

        assert_eq!(store.dependencies_of("b").unwrap(), vec!["a".to_string()]);
        assert_eq!(store.dependents_of("a").unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn load_into_store_rejects_self_dependency() {
        let store = Store::open_in_memory().unwrap();
        let mut graph = sample_graph();
        graph.tasks.get_mut("a").unwrap().depends_on = vec!["a".to_string()];

        let err = load_into_store(&store, &graph, "main").unwrap_err();
        assert!(matches!(err, CoreError::TaskGraph(_)));
    }
}
