//! Amendment Context Handler (§4.K): formats a parent run's active
//! decisions into a fixed framing block for injection into an amendment
//! run's phase prompts, and accumulates the in-memory supersession log
//! that callers persist via `DecisionStore::supersede_decision`.

use substrate_store::models::Decision;

use crate::cost::estimate_tokens;

const HEADER: &str = "=== AMENDMENT CONTEXT ===\nThis is an amendment run. The following decisions were established in the parent run...";
const FOOTER: &str = "=== END AMENDMENT CONTEXT ===";

/// Renders the fixed framing block from `decisions`, in the order given
/// (callers pass `DecisionStore::load_parent_run_decisions`'s result,
/// optionally pre-filtered to a set of phases), grouped under one
/// `[Phase: ...]` heading per phase in first-appearance order.
pub fn build_context_block(decisions: &[Decision], concept: Option<&str>) -> String {
    let mut phase_order: Vec<&str> = Vec::new();
    let mut by_phase: std::collections::HashMap<&str, Vec<&Decision>> = std::collections::HashMap::new();
    for decision in decisions {
        let phase = decision.phase.as_str();
        if !by_phase.contains_key(phase) {
            phase_order.push(phase);
        }
        by_phase.entry(phase).or_default().push(decision);
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for phase in phase_order {
        out.push_str(&format!("[Phase: {phase}]\n"));
        for decision in &by_phase[phase] {
            out.push_str(&format!("  - {}/{}: {}\n", decision.category, decision.key, decision.value));
            if let Some(rationale) = &decision.rationale {
                out.push_str(&format!("    Rationale: {rationale}\n"));
            }
        }
    }
    if let Some(concept) = concept {
        out.push_str(&format!("Concept being explored: {concept}\n"));
    }
    out.push_str(FOOTER);
    out
}

/// Fits `block` within `budget_tokens`: returns it unchanged if it already
/// fits, a truncated copy with a `[TRUNCATED]` marker if there's partial
/// room, or `None` if there is no room at all (§4.K).
pub fn fit_to_budget(block: &str, budget_tokens: u64) -> Option<String> {
    if estimate_tokens(block) <= budget_tokens {
        return Some(block.to_string());
    }
    if budget_tokens == 0 {
        return None;
    }
    let budget_chars = (budget_tokens as usize) * 4;
    if budget_chars == 0 {
        return None;
    }
    let mut truncated: String = block.chars().take(budget_chars).collect();
    truncated.push_str("\n[TRUNCATED]");
    Some(truncated)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SupersessionLogEntry {
    pub original_decision_id: String,
    pub superseding_decision_id: String,
    pub phase: String,
    pub key: String,
    pub reason: Option<String>,
    pub logged_at: i64,
}

/// Accumulated per-run, in memory; §4.B persistence (`supersede_decision`)
/// is the caller's responsibility, not this log's.
#[derive(Debug, Clone, Default)]
pub struct SupersessionLog {
    entries: Vec<SupersessionLogEntry>,
}

impl SupersessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        original_decision_id: impl Into<String>,
        superseding_decision_id: impl Into<String>,
        phase: impl Into<String>,
        key: impl Into<String>,
        reason: Option<String>,
    ) {
        self.entries.push(SupersessionLogEntry {
            original_decision_id: original_decision_id.into(),
            superseding_decision_id: superseding_decision_id.into(),
            phase: phase.into(),
            key: key.into(),
            reason,
            logged_at: substrate_store::now_ms(),
        });
    }

    pub fn entries(&self) -> &[SupersessionLogEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(phase: &str, category: &str, key: &str, value: &str) -> Decision {
        Decision::new(Some("parent".to_string()), phase, category, key, value)
    }

    #[test]
    fn renders_fixed_framing_block_grouped_by_phase() {
        let decisions = vec![
            decision("planning", "tech", "db", "SQLite").with_rationale("simplest for single-writer WAL"),
            decision("planning", "tech", "lang", "Rust"),
        ];
        let block = build_context_block(&decisions, Some("a caching layer"));
        assert!(block.starts_with("=== AMENDMENT CONTEXT ==="));
        assert!(block.ends_with("=== END AMENDMENT CONTEXT ==="));
        assert!(block.contains("[Phase: planning]"));
        assert!(block.contains("tech/db: SQLite"));
        assert!(block.contains("Rationale: simplest for single-writer WAL"));
        assert!(block.contains("Concept being explored: a caching layer"));
    }

    #[test]
    fn fit_returns_unchanged_when_within_budget() {
        let block = "short block";
        assert_eq!(fit_to_budget(block, 1000), Some(block.to_string()));
    }

    #[test]
    fn fit_truncates_with_marker_when_partial_room() {
        let block = "x".repeat(400);
        let truncated = fit_to_budget(&block, 20).unwrap();
        assert!(truncated.ends_with("[TRUNCATED]"));
    }

    #[test]
    fn fit_drops_entirely_when_no_room() {
        let block = "x".repeat(400);
        assert_eq!(fit_to_budget(&block, 0), None);
    }

    #[test]
    fn supersession_log_accumulates_entries_in_order() {
        let mut log = SupersessionLog::new();
        log.record("old1", "new1", "planning", "db", Some("revisited after amendment".to_string()));
        log.record("old2", "new2", "solutioning", "arch", None);
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[0].key, "db");
        assert_eq!(log.entries()[1].reason, None);
    }
}
