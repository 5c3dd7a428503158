//! Quality-Gate Framework (§4.G): evaluates structured sub-agent output
//! against registered gates, tracks a bounded retry counter per gate, and
//! composes gates into short-circuiting pipelines.

mod kinds;

use serde_json::Value;
use tracing::debug;

pub use kinds::{ac_validation, code_review_verdict, schema_compliance, test_coverage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// What a gate's evaluator decided about one piece of output.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub pass: bool,
    pub issues: Vec<String>,
    pub severity: Severity,
}

impl Evaluation {
    pub fn pass() -> Self {
        Self { pass: true, issues: Vec::new(), severity: Severity::Info }
    }

    pub fn fail(severity: Severity, issues: Vec<String>) -> Self {
        Self { pass: false, issues, severity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Proceed,
    Retry,
    Warn,
    Escalate,
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub action: Action,
    pub retries_remaining: u32,
    pub issues: Vec<String>,
}

pub type Evaluator = Box<dyn Fn(&Value) -> Evaluation + Send + Sync>;

/// One named check with a bounded retry budget (§4.G).
pub struct Gate {
    pub name: String,
    max_retries: u32,
    attempts: u32,
    evaluator: Evaluator,
}

impl Gate {
    pub fn new(name: impl Into<String>, max_retries: u32, evaluator: Evaluator) -> Self {
        Self { name: name.into(), max_retries, attempts: 0, evaluator }
    }

    /// Evaluates `output` and transitions the retry counter.
    ///
    /// A pass always returns `proceed`, with the counter reset for the next
    /// task that reuses this gate instance. A failure increments `attempts`
    /// while budget remains (`retry`); once `attempts == max_retries` it
    /// reports `warn` with zero retries remaining rather than failing the
    /// task outright — escalation is a pipeline-level decision (§4.G).
    pub fn evaluate(&mut self, output: &Value) -> GateOutcome {
        let evaluation = (self.evaluator)(output);
        if evaluation.pass {
            self.attempts = 0;
            return GateOutcome { action: Action::Proceed, retries_remaining: 0, issues: Vec::new() };
        }

        if self.attempts < self.max_retries {
            self.attempts += 1;
            let remaining = self.max_retries - self.attempts;
            debug!(gate = %self.name, attempts = self.attempts, remaining, "gate failed, retrying");
            GateOutcome { action: Action::Retry, retries_remaining: remaining, issues: evaluation.issues }
        } else {
            debug!(gate = %self.name, "gate exhausted retries, warning");
            GateOutcome { action: Action::Warn, retries_remaining: 0, issues: evaluation.issues }
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// One entry in a pipeline run report.
#[derive(Debug, Clone)]
pub struct PipelineIssue {
    pub gate: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub action: Action,
    pub gates_run: usize,
    pub gates_passed: usize,
    pub issues: Vec<PipelineIssue>,
}

/// Composes gates and short-circuits on the first non-`proceed` outcome
/// (§4.G "Pipelines").
pub struct GatePipeline {
    gates: Vec<Gate>,
}

impl GatePipeline {
    pub fn new(gates: Vec<Gate>) -> Self {
        Self { gates }
    }

    pub fn run(&mut self, output: &Value) -> PipelineResult {
        let mut gates_run = 0;
        let mut gates_passed = 0;

        for gate in &mut self.gates {
            gates_run += 1;
            let outcome = gate.evaluate(output);
            if outcome.action == Action::Proceed {
                gates_passed += 1;
                continue;
            }

            let severity = if outcome.action == Action::Retry { Severity::Warn } else { Severity::Error };
            let issues = outcome
                .issues
                .into_iter()
                .map(|message| PipelineIssue { gate: gate.name.clone(), severity, message })
                .collect();
            return PipelineResult { action: outcome.action, gates_run, gates_passed, issues };
        }

        PipelineResult { action: Action::Proceed, gates_run, gates_passed, issues: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn always_fail() -> Evaluator {
        Box::new(|_| Evaluation::fail(Severity::Error, vec!["nope".to_string()]))
    }

    #[test]
    fn pass_resets_counter_and_proceeds() {
        let mut gate = Gate::new("t", 2, Box::new(|v| {
            if v["ok"] == true { Evaluation::pass() } else { Evaluation::fail(Severity::Error, vec![]) }
        }));
        assert_eq!(gate.evaluate(&json!({"ok": false})).action, Action::Retry);
        assert_eq!(gate.evaluate(&json!({"ok": true})).action, Action::Proceed);
        assert_eq!(gate.attempts, 0);
    }

    #[test]
    fn exhausting_retries_warns_not_escalates() {
        let mut gate = Gate::new("t", 1, always_fail());
        assert_eq!(gate.evaluate(&json!({})).action, Action::Retry);
        assert_eq!(gate.evaluate(&json!({})).action, Action::Warn);
    }

    #[test]
    fn pipeline_short_circuits_on_first_failure() {
        let gates = vec![Gate::new("a", 0, always_fail()), Gate::new("b", 0, always_fail())];
        let mut pipeline = GatePipeline::new(gates);
        let result = pipeline.run(&json!({}));
        assert_eq!(result.gates_run, 1);
        assert_eq!(result.gates_passed, 0);
        assert_eq!(result.issues[0].gate, "a");
    }
}
