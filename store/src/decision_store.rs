use tracing::debug;

use crate::db::Store;
use crate::error::Result;
use crate::filter::{Filter, FilterOp};
use crate::models::{Artifact, Constraint, Decision, PipelineRun, Requirement};

/// Thin typed API over the generic [`Store`] for the six append-only
/// pipeline tables (§4.B). Every write here is a single `INSERT`/`UPDATE`;
/// none mutate `value`/`rationale` in place.
pub struct DecisionStore<'a> {
    store: &'a Store,
}

impl<'a> DecisionStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn create_pipeline_run(&self, run: PipelineRun) -> Result<PipelineRun> {
        self.store.insert(&run)?;
        Ok(run)
    }

    pub fn get_pipeline_run(&self, id: &str) -> Result<Option<PipelineRun>> {
        self.store.get(id)
    }

    pub fn update_pipeline_run(&self, run: &PipelineRun) -> Result<()> {
        self.store.update(run)
    }

    pub fn create_decision(&self, decision: Decision) -> Result<Decision> {
        self.store.insert(&decision)?;
        Ok(decision)
    }

    pub fn create_requirement(&self, requirement: Requirement) -> Result<Requirement> {
        self.store.insert(&requirement)?;
        Ok(requirement)
    }

    pub fn create_constraint(&self, constraint: Constraint) -> Result<Constraint> {
        self.store.insert(&constraint)?;
        Ok(constraint)
    }

    pub fn register_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        self.store.insert(&artifact)?;
        Ok(artifact)
    }

    /// Add a token-usage delta to a run's running snapshot. Stored as an
    /// opaque JSON blob on the run (the structured per-agent breakdown lives
    /// in `cost_entries`; this snapshot is the orchestrator's fast-path
    /// read for phase-completion summaries).
    pub fn add_token_usage(&self, run_id: &str, phase: &str, input_tokens: i64, output_tokens: i64) -> Result<()> {
        let mut run = self.store.get_required::<PipelineRun>(run_id)?;
        let snapshot = run
            .token_usage_snapshot
            .as_object_mut()
            .expect("token_usage_snapshot is always an object");
        let entry = snapshot
            .entry(phase.to_string())
            .or_insert_with(|| serde_json::json!({"input_tokens": 0, "output_tokens": 0}));
        entry["input_tokens"] = serde_json::json!(entry["input_tokens"].as_i64().unwrap_or(0) + input_tokens);
        entry["output_tokens"] = serde_json::json!(entry["output_tokens"].as_i64().unwrap_or(0) + output_tokens);
        self.store.update(&run)
    }

    /// Set `old.superseded_by = new_id`, idempotent if already set to the
    /// same target (§4.B).
    pub fn supersede_decision(&self, old_id: &str, new_id: &str) -> Result<()> {
        let mut old = self.store.get_required::<Decision>(old_id)?;
        debug!(old_id, new_id, "supersede_decision: called");
        old.supersede(new_id);
        self.store.update(&old)
    }

    /// All non-superseded decisions from `parent_run_id`, in insertion
    /// order. Required by amendment runs (§4.K).
    pub fn load_parent_run_decisions(&self, parent_run_id: &str) -> Result<Vec<Decision>> {
        let filter = Filter::new()
            .eq("pipeline_run_id", parent_run_id)
            .op("superseded_by", FilterOp::IsNull, "")
            .order_by("updated_at", true);
        self.store.query(&filter)
    }

    pub fn get_latest_artifact(&self, pipeline_run_id: &str, phase: &str, artifact_type: &str) -> Result<Option<Artifact>> {
        let filter = Filter::new()
            .eq("pipeline_run_id", pipeline_run_id)
            .eq("phase", phase)
            .eq("artifact_type", artifact_type)
            .order_by("updated_at", false)
            .limit(1);
        Ok(self.store.query::<Artifact>(&filter)?.into_iter().next())
    }

    pub fn list_artifacts(&self, filter: &Filter) -> Result<Vec<Artifact>> {
        self.store.query(filter)
    }

    pub fn decisions_for_phase(&self, pipeline_run_id: &str, phase: &str) -> Result<Vec<Decision>> {
        let filter = Filter::new()
            .eq("pipeline_run_id", pipeline_run_id)
            .eq("phase", phase)
            .op("superseded_by", FilterOp::IsNull, "")
            .order_by("updated_at", true);
        self.store.query(&filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, PipelineRun};

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn supersede_then_load_parent_decisions_omits_superseded() {
        let db = store();
        let ds = DecisionStore::new(&db);
        let run = ds.create_pipeline_run(PipelineRun::new("substrate")).unwrap();

        let old = ds
            .create_decision(Decision::new(Some(run.id.clone()), "planning", "tech", "db", "Postgres"))
            .unwrap();
        let new = ds
            .create_decision(Decision::new(Some(run.id.clone()), "planning", "tech", "db", "SQLite"))
            .unwrap();
        ds.supersede_decision(&old.id, &new.id).unwrap();

        let active = ds.load_parent_run_decisions(&run.id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, new.id);
        assert_eq!(active[0].value, "SQLite");
    }

    #[test]
    fn get_latest_artifact_returns_most_recent() {
        let db = store();
        let ds = DecisionStore::new(&db);
        let run = ds.create_pipeline_run(PipelineRun::new("substrate")).unwrap();
        ds.register_artifact(Artifact::new(Some(run.id.clone()), "planning", "plan", "plan-v1.md", "h1"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ds
            .register_artifact(Artifact::new(Some(run.id.clone()), "planning", "plan", "plan-v2.md", "h2"))
            .unwrap();

        let latest = ds.get_latest_artifact(&run.id, "planning", "plan").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}
