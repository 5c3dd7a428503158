//! Phase Orchestrator (§4.K): a state machine over
//! `[analysis, planning, solutioning, implementation]`. Each phase
//! dispatches one sub-agent, persists its structured output as
//! decisions/artifacts, then emits events — in that order, so a crash
//! between persistence and emission is recoverable by re-deriving state
//! from the database on restart (§5 "Ordering guarantees").

pub mod amendment;

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde_json::Value;
use substrate_pack::MethodologyPack;
use substrate_store::decision_store::DecisionStore;
use substrate_store::models::{Artifact, Decision, PipelineRun, PipelineRunStatus};
use substrate_store::Store;
use tracing::{info, warn};

use crate::context::{self, Priority, Section};
use crate::cost::estimate_tokens;
use crate::dispatcher::{self, DispatchRequest, DispatchStatus};
use crate::error::{CoreError, Result};
use crate::events::EventEmitter;

/// Token budget handed to the Context Compiler for a single phase prompt
/// (§4.D). Generous relative to a single template + amendment block +
/// prior-decisions digest, since the phase prompt is the only thing in
/// flight per sub-agent call (unlike the implementation phase's
/// per-task prompts, which share a worker-pool-wide budget).
const PHASE_CONTEXT_TOKEN_BUDGET: u64 = 12_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analysis,
    Planning,
    Solutioning,
    Implementation,
}

pub const PHASE_ORDER: [Phase; 4] = [Phase::Analysis, Phase::Planning, Phase::Solutioning, Phase::Implementation];

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analysis => "analysis",
            Phase::Planning => "planning",
            Phase::Solutioning => "solutioning",
            Phase::Implementation => "implementation",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "analysis" => Ok(Phase::Analysis),
            "planning" => Ok(Phase::Planning),
            "solutioning" => Ok(Phase::Solutioning),
            "implementation" => Ok(Phase::Implementation),
            other => Err(CoreError::TaskConfig(format!("unknown phase '{other}'"))),
        }
    }

    fn order(&self) -> usize {
        PHASE_ORDER.iter().position(|p| p == self).expect("phase is always in PHASE_ORDER")
    }

    pub fn next(&self) -> Option<Phase> {
        PHASE_ORDER.get(self.order() + 1).copied()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseResult {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub result: PhaseResult,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub decisions_created: usize,
    pub artifact_paths: Vec<String>,
    /// The phase's raw parsed output, for callers that need phase-specific
    /// fields (e.g. the solutioning phase's `epics` feeding §4.J).
    pub data: Option<Value>,
    /// Set when the Context Compiler (§4.D) had to truncate or drop a
    /// section to fit `PHASE_CONTEXT_TOKEN_BUDGET` (§8 invariant 6).
    pub context_truncated: bool,
}

/// Renders a run's prior active decisions as a flat digest, most recently
/// updated last, for the Optional "prior decisions" context section.
fn render_decisions(decisions: &[Decision]) -> String {
    decisions
        .iter()
        .map(|d| format!("[{}/{}] {} = {}", d.phase, d.category, d.key, d.value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds the compiled, budgeted prompt for one phase dispatch: substitutes
/// `{{var}}` placeholders into the pack template, then assembles it with
/// the amendment prefix and prior-run decisions as priority-ordered
/// sections (§4.D). Kept free of I/O so it is unit-testable without a
/// store or dispatcher.
fn build_phase_prompt(
    template: &str,
    vars: &BTreeMap<String, String>,
    amendment_prefix: Option<&str>,
    prior_decisions: &[Decision],
) -> context::CompiledContext {
    let instructions = context::substitute_placeholders(template, vars);
    let mut sections = vec![Section { name: "instructions".to_string(), priority: Priority::Required, text: instructions }];

    if let Some(prefix) = amendment_prefix {
        sections.push(Section { name: "amendment".to_string(), priority: Priority::Important, text: prefix.to_string() });
    }

    if !prior_decisions.is_empty() {
        sections.push(Section {
            name: "prior_decisions".to_string(),
            priority: Priority::Optional,
            text: format!("Decisions recorded so far in this run:\n{}", render_decisions(prior_decisions)),
        });
    }

    context::compile(sections, PHASE_CONTEXT_TOKEN_BUDGET)
}

/// Validates `--from`/`--stop-after` per §4.K: `stop_after` must not
/// precede `from` in phase order.
pub fn validate_phase_range(from: Phase, stop_after: Option<Phase>) -> Result<()> {
    if let Some(stop_after) = stop_after {
        if stop_after.order() < from.order() {
            return Err(CoreError::TaskConfig(format!(
                "--stop-after {stop_after} precedes --from {from} in phase order"
            )));
        }
    }
    Ok(())
}

/// Drives one run of the phase state machine. Does not own the implementation
/// phase's task graph execution (§4.J); callers fetch
/// `PhaseOutcome::data` from the solutioning phase and hand it to a
/// `TaskGraphEngine` themselves.
pub struct PhaseOrchestrator {
    store: Arc<Store>,
    pack: Arc<dyn MethodologyPack + Send + Sync>,
    events: EventEmitter,
    agent_binary_for: fn(&str) -> String,
}

impl PhaseOrchestrator {
    pub fn new(store: Arc<Store>, pack: Arc<dyn MethodologyPack + Send + Sync>, events: EventEmitter) -> Self {
        Self { store, pack, events, agent_binary_for: |agent| agent.to_string() }
    }

    /// Runs one phase: fetches its prompt template from the pack, optionally
    /// prefixes the amendment context block, dispatches the sub-agent, and
    /// persists the phase-appropriate decisions/artifacts on success.
    pub async fn run_phase(
        &self,
        run_id: &str,
        phase: Phase,
        agent: &str,
        amendment_prefix: Option<&str>,
    ) -> Result<PhaseOutcome> {
        let run = self.store.get_required::<PipelineRun>(run_id)?;
        let ds = DecisionStore::new(&self.store);
        let prior_decisions = ds.load_parent_run_decisions(run_id)?;

        let mut vars = BTreeMap::new();
        vars.insert("methodology".to_string(), run.methodology.clone());
        vars.insert("phase".to_string(), phase.as_str().to_string());

        let template = self.pack.get_prompt(phase.as_str()).map_err(CoreError::Pack)?;
        let compiled = build_phase_prompt(&template, &vars, amendment_prefix, &prior_decisions);
        if compiled.truncated {
            warn!(run_id, phase = phase.as_str(), "context compiler truncated or dropped a section to fit budget");
        }

        let binary = (self.agent_binary_for)(agent);
        let request = DispatchRequest::new(agent, phase.as_str(), compiled.prompt);
        let dispatch_result = dispatcher::dispatch(&binary, request, None).await;

        self.events.story_phase(phase.as_str(), phase.order(), PHASE_ORDER.len());

        match dispatch_result.status {
            DispatchStatus::Completed => {
                let value = dispatch_result.parsed.clone().unwrap_or(Value::Null);
                let (decisions_created, artifact_paths) = persist_phase_output(&ds, run_id, phase, &value)?;

                let mut run = run;
                run.set_phase(phase.as_str());
                self.store.update(&run)?;

                self.events.story_done(phase.as_str(), &format!("{decisions_created} decisions recorded"));
                info!(run_id, phase = phase.as_str(), decisions_created, "phase completed");

                Ok(PhaseOutcome {
                    result: PhaseResult::Success,
                    input_tokens: dispatch_result.token_estimate.input,
                    output_tokens: dispatch_result.token_estimate.output,
                    decisions_created,
                    artifact_paths,
                    data: Some(value),
                    context_truncated: compiled.truncated,
                })
            }
            DispatchStatus::Failed | DispatchStatus::Timeout => {
                let reason = dispatch_result.parse_error.clone().unwrap_or_else(|| "sub-agent dispatch failed".to_string());
                self.events.story_escalation(phase.as_str(), &reason);
                Ok(PhaseOutcome {
                    result: PhaseResult::Failed,
                    input_tokens: dispatch_result.token_estimate.input,
                    output_tokens: dispatch_result.token_estimate.output,
                    decisions_created: 0,
                    artifact_paths: Vec::new(),
                    data: None,
                    context_truncated: compiled.truncated,
                })
            }
        }
    }

    pub fn mark_run_status(&self, run_id: &str, status: PipelineRunStatus) -> Result<()> {
        let mut run = self.store.get_required::<PipelineRun>(run_id)?;
        run.set_status(status);
        Ok(self.store.update(&run)?)
    }
}

/// Persists a phase's parsed sub-agent output per the §6 record shapes.
/// Returns `(decisions_created, artifact_paths)`.
fn persist_phase_output(ds: &DecisionStore, run_id: &str, phase: Phase, value: &Value) -> Result<(usize, Vec<String>)> {
    match phase {
        Phase::Analysis => {
            let Some(brief) = value.get("product_brief") else { return Ok((0, Vec::new())) };
            let mut count = 0;
            for key in ["problem_statement", "target_users", "core_features", "success_metrics", "constraints"] {
                if let Some(field) = brief.get(key) {
                    ds.create_decision(Decision::new(Some(run_id.to_string()), "analysis", "product_brief", key, render(field)))
                        .map_err(CoreError::Store)?;
                    count += 1;
                }
            }
            Ok((count, Vec::new()))
        }
        Phase::Planning => {
            let mut count = 0;
            for key in ["functional_requirements", "non_functional_requirements", "user_stories", "tech_stack", "domain_model", "out_of_scope"]
            {
                if let Some(field) = value.get(key) {
                    ds.create_decision(Decision::new(Some(run_id.to_string()), "planning", "plan", key, render(field)))
                        .map_err(CoreError::Store)?;
                    count += 1;
                }
            }
            Ok((count, Vec::new()))
        }
        Phase::Solutioning => {
            let mut count = 0;
            let mut artifact_paths = Vec::new();
            if let Some(decisions) = value.get("architecture_decisions").and_then(Value::as_array) {
                for entry in decisions {
                    let category = entry.get("category").and_then(Value::as_str).unwrap_or("architecture");
                    let key = entry.get("key").and_then(Value::as_str).unwrap_or("unspecified");
                    let decision_value = entry.get("value").map(render).unwrap_or_default();
                    let mut decision = Decision::new(Some(run_id.to_string()), "solutioning", category, key, decision_value);
                    if let Some(rationale) = entry.get("rationale").and_then(Value::as_str) {
                        decision = decision.with_rationale(rationale);
                    }
                    ds.create_decision(decision).map_err(CoreError::Store)?;
                    count += 1;
                }
            }
            if let Some(epics) = value.get("epics").and_then(Value::as_array) {
                for epic in epics {
                    let title = epic.get("title").and_then(Value::as_str).unwrap_or("untitled epic");
                    let content_hash = hash_content(&render(epic));
                    let artifact = Artifact::new(Some(run_id.to_string()), "solutioning", "epic", title, content_hash);
                    artifact_paths.push(artifact.path.clone());
                    ds.register_artifact(artifact).map_err(CoreError::Store)?;
                }
            }
            Ok((count, artifact_paths))
        }
        Phase::Implementation => Ok((0, Vec::new())),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn hash_content(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Formats the human-readable Phase Completion Summary (§4.K
/// "--stop-after"): ≤ 500 whitespace-separated words, artifact list
/// truncated with `"…N more"`, and the literal resume command.
pub fn format_phase_completion_summary(
    run_id: &str,
    phase: Phase,
    duration_ms: u64,
    decisions_count: usize,
    artifact_paths: &[String],
    cli_name: &str,
) -> String {
    let next = phase.next();
    let mut lines = vec![
        format!("Phase '{phase}' complete in {:.1}s.", duration_ms as f64 / 1000.0),
        format!("Decisions recorded: {decisions_count}."),
    ];

    const MAX_ARTIFACTS_SHOWN: usize = 10;
    if artifact_paths.is_empty() {
        lines.push("Artifacts: none.".to_string());
    } else {
        let shown: Vec<&str> = artifact_paths.iter().take(MAX_ARTIFACTS_SHOWN).map(String::as_str).collect();
        let mut artifact_line = format!("Artifacts: {}", shown.join(", "));
        if artifact_paths.len() > MAX_ARTIFACTS_SHOWN {
            artifact_line.push_str(&format!(", \u{2026}{} more", artifact_paths.len() - MAX_ARTIFACTS_SHOWN));
        }
        lines.push(artifact_line);
    }

    match next {
        Some(next_phase) => lines.push(format!("Next phase: {next_phase}.")),
        None => lines.push("This was the final phase.".to_string()),
    }
    lines.push(format!("Resume with: {cli_name} auto resume --run-id {run_id}"));

    let mut summary = lines.join(" ");
    let words: Vec<&str> = summary.split_whitespace().collect();
    if words.len() > 500 {
        summary = words[..500].join(" ");
    }
    summary
}

/// Token-count estimate for a run's accumulated prompt/response text,
/// used by callers that need a quick sanity check before formatting a
/// phase-completion summary. Thin wrapper kept for symmetry with the
/// Context Compiler's estimator.
pub fn estimate_phase_tokens(text: &str) -> u64 {
    estimate_tokens(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_range_rejects_stop_after_before_from() {
        let err = validate_phase_range(Phase::Solutioning, Some(Phase::Planning)).unwrap_err();
        assert!(matches!(err, CoreError::TaskConfig(_)));
    }

    #[test]
    fn phase_range_accepts_equal_or_later_stop_after() {
        assert!(validate_phase_range(Phase::Planning, Some(Phase::Planning)).is_ok());
        assert!(validate_phase_range(Phase::Planning, Some(Phase::Implementation)).is_ok());
    }

    #[test]
    fn next_phase_chain_ends_at_implementation() {
        assert_eq!(Phase::Analysis.next(), Some(Phase::Planning));
        assert_eq!(Phase::Implementation.next(), None);
    }

    #[test]
    fn summary_contains_literal_resume_command() {
        let summary = format_phase_completion_summary("run-1", Phase::Planning, 4200, 3, &["plan.md".to_string()], "substrate");
        assert!(summary.contains("substrate auto resume --run-id run-1"));
        assert!(summary.split_whitespace().count() <= 500);
    }

    #[test]
    fn summary_truncates_long_artifact_list() {
        let artifacts: Vec<String> = (0..50).map(|i| format!("artifact-{i}.md")).collect();
        let summary = format_phase_completion_summary("run-1", Phase::Solutioning, 1000, 5, &artifacts, "substrate");
        assert!(summary.contains("\u{2026}40 more"));
    }

    #[test]
    fn persist_analysis_output_creates_one_decision_per_field() {
        let db = Store::open_in_memory().unwrap();
        let ds = DecisionStore::new(&db);
        let run = ds.create_pipeline_run(PipelineRun::new("substrate")).unwrap();
        let value = serde_json::json!({
            "result": "success",
            "product_brief": {
                "problem_statement": "users need X",
                "target_users": ["devs"],
            }
        });
        let (count, artifacts) = persist_phase_output(&ds, &run.id, Phase::Analysis, &value).unwrap();
        assert_eq!(count, 2);
        assert!(artifacts.is_empty());
    }

    #[test]
    fn build_phase_prompt_substitutes_placeholders_before_compiling() {
        let mut vars = BTreeMap::new();
        vars.insert("methodology".to_string(), "lean".to_string());
        vars.insert("phase".to_string(), "planning".to_string());
        let compiled = build_phase_prompt("methodology={{methodology}} phase={{phase}}", &vars, None, &[]);
        assert_eq!(compiled.prompt, "methodology=lean phase=planning");
        assert!(!compiled.truncated);
    }

    #[test]
    fn build_phase_prompt_includes_amendment_and_prior_decisions() {
        let vars = BTreeMap::new();
        let decisions = vec![Decision::new(None, "planning", "tech", "db", "SQLite")];
        let compiled = build_phase_prompt("base instructions", &vars, Some("amend this"), &decisions);
        assert!(compiled.prompt.contains("base instructions"));
        assert!(compiled.prompt.contains("amend this"));
        assert!(compiled.prompt.contains("[planning/tech] db = SQLite"));
    }

    #[test]
    fn persist_solutioning_output_creates_decisions_and_artifacts() {
        let db = Store::open_in_memory().unwrap();
        let ds = DecisionStore::new(&db);
        let run = ds.create_pipeline_run(PipelineRun::new("substrate")).unwrap();
        let value = serde_json::json!({
            "architecture_decisions": [{"category": "tech", "key": "db", "value": "SQLite", "rationale": "simple"}],
            "epics": [{"title": "Auth", "description": "login flow"}],
        });
        let (count, artifacts) = persist_phase_output(&ds, &run.id, Phase::Solutioning, &value).unwrap();
        assert_eq!(count, 1);
        assert_eq!(artifacts, vec!["Auth".to_string()]);
    }
}
