//! Token/Cost Engine (§4.E): heuristic token counting, a provider/model
//! rate table with alias resolution, cost estimation, and two-scope budget
//! enforcement.

mod rates;

use tracing::debug;

use crate::error::CoreError;
pub use rates::RateTable;

/// Conservative heuristic token counter: `ceil(chars / 4)`, multiplied by
/// 1.10 whenever the text contains a fenced-code marker (any triple
/// backtick, inline or block — §9 open question (c) preserves this rather
/// than distinguishing real code fences).
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as f64;
    let base = (chars / 4.0).ceil();
    let adjusted = if text.contains("```") { base * 1.10 } else { base };
    adjusted.ceil() as u64
}

/// `tIn*input_rate/1e6 + tOut*output_rate/1e6`.
pub fn estimate_cost(rates: &RateTable, provider: &str, model: &str, tokens_in: u64, tokens_out: u64) -> Option<f64> {
    let rate = rates.lookup(provider, model)?;
    Some(tokens_in as f64 * rate.input_rate_per_million_usd / 1e6 + tokens_out as f64 * rate.output_rate_per_million_usd / 1e6)
}

/// As [`estimate_cost`], but returns `0.0` for an unknown provider/model
/// pair instead of failing — used on the write path so an unrecognized
/// model never blocks recording a cost entry.
pub fn estimate_cost_safe(rates: &RateTable, provider: &str, model: &str, tokens_in: u64, tokens_out: u64) -> f64 {
    estimate_cost(rates, provider, model, tokens_in, tokens_out).unwrap_or_else(|| {
        debug!(provider, model, "estimate_cost_safe: unknown provider/model, returning 0");
        0.0
    })
}

/// Checks a prospective spend against a budget ceiling, scoped per-task or
/// per-session. The engine does not kill anything itself — it reports so
/// the orchestrator can signal a drain (§4.E, §5 "Budget counters").
pub fn check_budget(budget_usd: Option<f64>, current_usd: f64) -> Result<(), CoreError> {
    if let Some(limit) = budget_usd {
        if current_usd >= limit {
            return Err(CoreError::BudgetExceeded { limit, current: current_usd });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_uses_base_heuristic() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn fenced_code_gets_ten_percent_bump() {
        let text = "```rust\nfn main() {}\n```";
        let base = (text.chars().count() as f64 / 4.0).ceil();
        let expected = (base * 1.10).ceil() as u64;
        assert_eq!(estimate_tokens(text), expected);
    }

    #[test]
    fn check_budget_flags_at_or_over_limit() {
        assert!(check_budget(Some(10.0), 9.99).is_ok());
        assert!(check_budget(Some(10.0), 10.0).is_err());
        assert!(check_budget(None, 1_000_000.0).is_ok());
    }
}
