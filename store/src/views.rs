use serde::Serialize;

use crate::db::Store;
use crate::error::Result;
use crate::filter::Filter;
use crate::models::{BillingMode, CostEntry, Task, TaskStatus};

/// `ready_tasks`: tasks whose status is `pending` and whose every
/// dependency has reached a status in `{completed, cancelled}` (§3, §8.3).
pub fn ready_tasks(store: &Store, session_id: &str) -> Result<Vec<Task>> {
    let candidates: Vec<Task> = store.query(&Filter::new().eq("session_id", session_id).eq("status", "pending"))?;
    let mut ready = Vec::new();
    for task in candidates {
        let deps = store.dependencies_of(&task.id)?;
        let mut all_satisfied = true;
        for dep_id in &deps {
            let dep: Option<Task> = store.get(dep_id)?;
            let satisfied = dep.map(|d| d.status.satisfies_dependency()).unwrap_or(false);
            if !satisfied {
                all_satisfied = false;
                break;
            }
        }
        if all_satisfied {
            ready.push(task);
        }
    }
    Ok(ready)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentCostBreakdown {
    pub agent: String,
    pub cost_usd: f64,
    pub savings_usd: f64,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

/// `session_cost_summary`: per-session aggregate of every [`CostEntry`],
/// split by billing mode and by agent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionCostSummary {
    pub session_id: String,
    pub total_cost_usd: f64,
    pub total_savings_usd: f64,
    pub subscription_cost_usd: f64,
    pub api_cost_usd: f64,
    pub per_agent: Vec<AgentCostBreakdown>,
}

pub fn session_cost_summary(store: &Store, session_id: &str) -> Result<SessionCostSummary> {
    let entries: Vec<CostEntry> = store.query(&Filter::new().eq("session_id", session_id))?;
    let mut summary = SessionCostSummary {
        session_id: session_id.to_string(),
        ..Default::default()
    };
    let mut by_agent: std::collections::BTreeMap<String, AgentCostBreakdown> = std::collections::BTreeMap::new();

    for entry in &entries {
        summary.total_cost_usd += entry.cost_usd;
        summary.total_savings_usd += entry.savings_usd;
        match entry.billing_mode {
            BillingMode::Subscription => summary.subscription_cost_usd += entry.cost_usd,
            BillingMode::Api => summary.api_cost_usd += entry.cost_usd,
        }
        let agent_entry = by_agent.entry(entry.agent.clone()).or_insert_with(|| AgentCostBreakdown {
            agent: entry.agent.clone(),
            ..Default::default()
        });
        agent_entry.cost_usd += entry.cost_usd;
        agent_entry.savings_usd += entry.savings_usd;
        agent_entry.tokens_in += entry.tokens_in;
        agent_entry.tokens_out += entry.tokens_out;
    }

    summary.per_agent = by_agent.into_values().collect();
    Ok(summary)
}

/// Recompute and persist `Session.total_cost_usd` from `cost_entries`,
/// enforcing §8 invariant 4 (the two must always agree) after any write
/// that bypasses the session's own counter increment.
pub fn reconcile_session_total_cost(store: &Store, session_id: &str) -> Result<f64> {
    let summary = session_cost_summary(store, session_id)?;
    let mut session = store.get_required::<crate::models::Session>(session_id)?;
    session.total_cost_usd = summary.total_cost_usd;
    session.updated_at = crate::record::now_ms();
    store.update(&session)?;
    Ok(summary.total_cost_usd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;

    #[test]
    fn ready_tasks_excludes_tasks_with_unmet_dependencies() {
        let db = Store::open_in_memory().unwrap();
        let session = Session::new("graph.yml", "main");
        db.insert(&session).unwrap();

        let mut dep = Task::new("a", &session.id, "a", "do a");
        dep.set_status(TaskStatus::Running);
        db.insert(&dep).unwrap();

        let b = Task::new("b", &session.id, "b", "do b").with_depends_on(vec!["a".into()]);
        db.insert(&b).unwrap();
        db.add_dependency("b", "a").unwrap();

        let c = Task::new("c", &session.id, "c", "do c");
        db.insert(&c).unwrap();

        let ready = ready_tasks(&db, &session.id).unwrap();
        let ids: Vec<_> = ready.iter().map(|t| t.id.clone()).collect();
        assert!(ids.contains(&"c".to_string()));
        assert!(!ids.contains(&"b".to_string()));

        dep.set_status(TaskStatus::Completed);
        db.update(&dep).unwrap();
        let ready = ready_tasks(&db, &session.id).unwrap();
        let ids: Vec<_> = ready.iter().map(|t| t.id.clone()).collect();
        assert!(ids.contains(&"b".to_string()));
    }
}
