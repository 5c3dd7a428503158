use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

pub use crate::models::task::BillingMode;

/// One recorded spend against a session, optionally attributed to a task.
///
/// Invariant (§8.4): `billing_mode = subscription ⇒ cost_usd = 0 ∧
/// savings_usd = equivalent_api_cost`; `billing_mode = api ⇒ savings_usd =
/// 0`. Enforced at construction, not by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: String,
    pub session_id: String,
    pub task_id: Option<String>,
    pub agent: String,
    pub provider: String,
    pub model: String,
    pub billing_mode: BillingMode,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub savings_usd: f64,
    pub created_at: i64,
}

impl CostEntry {
    /// `equivalent_api_cost` is the cost the call would have incurred under
    /// API billing; used to fill `savings_usd` for subscription entries.
    pub fn new(
        session_id: impl Into<String>,
        task_id: Option<String>,
        agent: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        billing_mode: BillingMode,
        tokens_in: i64,
        tokens_out: i64,
        equivalent_api_cost: f64,
    ) -> Self {
        let (cost_usd, savings_usd) = match billing_mode {
            BillingMode::Subscription => (0.0, equivalent_api_cost),
            BillingMode::Api => (equivalent_api_cost, 0.0),
        };
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            task_id,
            agent: agent.into(),
            provider: provider.into(),
            model: model.into(),
            billing_mode,
            tokens_in,
            tokens_out,
            cost_usd,
            savings_usd,
            created_at: now_ms(),
        }
    }
}

impl Record for CostEntry {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.created_at
    }
    fn collection_name() -> &'static str {
        "cost_entries"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("session_id", IndexValue::text(self.session_id.clone())),
            ("task_id", self.task_id.clone().into()),
            ("billing_mode", IndexValue::text(format!("{:?}", self.billing_mode))),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_billing_has_zero_cost_and_recorded_savings() {
        let entry = CostEntry::new("s1", None, "claude", "anthropic", "claude-3-5-sonnet-20241022", BillingMode::Subscription, 10_000, 2_000, 0.06);
        assert_eq!(entry.cost_usd, 0.0);
        assert!((entry.savings_usd - 0.06).abs() < 1e-9);
    }

    #[test]
    fn api_billing_has_zero_savings() {
        let entry = CostEntry::new("s1", None, "claude", "anthropic", "claude-3-5-sonnet-20241022", BillingMode::Api, 10_000, 2_000, 0.06);
        assert_eq!(entry.savings_usd, 0.0);
        assert!((entry.cost_usd - 0.06).abs() < 1e-9);
    }
}
