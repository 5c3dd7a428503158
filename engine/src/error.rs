use std::collections::BTreeMap;

use thiserror::Error;

/// Structured error taxonomy (§7). Every variant carries enough context to
/// build the `code` + message + context-map shape user-facing and
/// machine-facing (NDJSON) error reporting both need.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task config error: {0}")]
    TaskConfig(String),

    #[error("task graph error: {0}")]
    TaskGraph(String),

    #[error("task graph contains a cycle: {}", cycle_path.join(" -> "))]
    TaskGraphCycle { cycle_path: Vec<String> },

    #[error("task graph format incompatible: version {found}, supported {supported:?}")]
    TaskGraphIncompatibleFormat { found: String, supported: Vec<String> },

    #[error("worker error: {0}")]
    Worker(String),

    #[error("unknown agent: {0}")]
    WorkerNotFound(String),

    #[error("budget exceeded: limit {limit}, current {current}")]
    BudgetExceeded { limit: f64, current: f64 },

    #[error("git error: {0}")]
    Git(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config format incompatible: {0}")]
    ConfigIncompatibleFormat(String),

    #[error("recovery error: {0}")]
    Recovery(String),

    #[error("sub-agent dispatch timed out after {timeout_ms}ms")]
    DispatchTimeout { timeout_ms: u64 },

    #[error("sub-agent dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("schema validation failed: {0}")]
    SchemaValidationFailed(String),

    #[error("agent reported failure: {0}")]
    AgentReportedFailure(String),

    #[error(transparent)]
    Store(#[from] substrate_store::StoreError),

    #[error(transparent)]
    Pack(#[from] substrate_pack::PackError),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::TaskConfig(_) => "TaskConfig",
            CoreError::TaskGraph(_) => "TaskGraph",
            CoreError::TaskGraphCycle { .. } => "TaskGraphCycle",
            CoreError::TaskGraphIncompatibleFormat { .. } => "TaskGraphIncompatibleFormat",
            CoreError::Worker(_) => "Worker",
            CoreError::WorkerNotFound(_) => "WorkerNotFound",
            CoreError::BudgetExceeded { .. } => "BudgetExceeded",
            CoreError::Git(_) => "Git",
            CoreError::Config(_) => "Config",
            CoreError::ConfigIncompatibleFormat(_) => "ConfigIncompatibleFormat",
            CoreError::Recovery(_) => "Recovery",
            CoreError::DispatchTimeout { .. } => "DispatchTimeout",
            CoreError::DispatchFailed(_) => "DispatchFailed",
            CoreError::SchemaValidationFailed(_) => "SchemaValidationFailed",
            CoreError::AgentReportedFailure(_) => "AgentReportedFailure",
            CoreError::Store(_) => "Store",
            CoreError::Pack(_) => "Pack",
        }
    }

    /// Structured context map for machine-facing (NDJSON) error events.
    pub fn context(&self) -> BTreeMap<String, String> {
        let mut ctx = BTreeMap::new();
        match self {
            CoreError::TaskGraphCycle { cycle_path } => {
                ctx.insert("cycle_path".to_string(), cycle_path.join(" -> "));
            }
            CoreError::TaskGraphIncompatibleFormat { found, supported } => {
                ctx.insert("found".to_string(), found.clone());
                ctx.insert("supported".to_string(), supported.join(","));
            }
            CoreError::BudgetExceeded { limit, current } => {
                ctx.insert("limit".to_string(), limit.to_string());
                ctx.insert("current".to_string(), current.to_string());
            }
            CoreError::DispatchTimeout { timeout_ms } => {
                ctx.insert("timeout_ms".to_string(), timeout_ms.to_string());
            }
            _ => {}
        }
        ctx
    }

    /// The actionable next step shown to a human (§7 "user-visible
    /// behavior"). Falls back to the bare message when there's no specific
    /// remediation.
    pub fn actionable_message(&self) -> String {
        match self {
            CoreError::WorkerNotFound(agent) => {
                format!("Agent '{agent}' is unavailable. Run: `substrate adapters --health`")
            }
            CoreError::BudgetExceeded { limit, current } => {
                format!("Budget exceeded (${current:.2} of ${limit:.2}). Raise the budget or stop remaining tasks.")
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
