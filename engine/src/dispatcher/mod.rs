//! Sub-Agent Dispatcher (§4.F): spawns external agent CLIs as child
//! processes, captures stdio under a timeout, and parses the agent's
//! trailing YAML block.

mod process;
mod yaml_extract;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

pub use process::spawn_and_capture;
pub use yaml_extract::extract_last_yaml_block;

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub agent: String,
    pub task_type: String,
    pub prompt: String,
    pub stdin: Option<String>,
    pub env_overrides: HashMap<String, String>,
    pub timeout_ms: u64,
    pub cwd: Option<PathBuf>,
}

impl DispatchRequest {
    pub fn new(agent: impl Into<String>, task_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            task_type: task_type.into(),
            prompt: prompt.into(),
            stdin: None,
            env_overrides: HashMap::new(),
            timeout_ms: 10 * 60 * 1000,
            cwd: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct TokenEstimate {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub output: String,
    pub parsed: Option<Value>,
    pub parse_error: Option<String>,
    pub token_estimate: TokenEstimate,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
}

/// Spawns `agent` as a child process, writes the prompt (plus any explicit
/// `stdin`) then closes stdin, accumulates stdout/stderr to completion or a
/// forceful kill on timeout, and parses the trailing YAML block against
/// `output_schema`.
///
/// Single-shot: retry policy belongs to the caller (Phase Orchestrator or
/// Worker Pool), driven by the gate outcome (§4.F "Retries").
pub async fn dispatch(agent_binary: &str, request: DispatchRequest, output_schema: Option<&Value>) -> DispatchResult {
    debug!(agent = %request.agent, task_type = %request.task_type, "dispatch: called");
    let started = std::time::Instant::now();
    let stdin_payload = request.stdin.clone().unwrap_or_else(|| request.prompt.clone());
    let timeout = Duration::from_millis(request.timeout_ms);

    let capture = spawn_and_capture(agent_binary, &request, &stdin_payload, timeout).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let capture = match capture {
        Ok(c) => c,
        Err(timeout_capture) => {
            warn!(agent = %request.agent, timeout_ms = request.timeout_ms, "dispatch: timed out, killed child");
            return DispatchResult {
                status: DispatchStatus::Timeout,
                output: timeout_capture.stderr,
                parsed: None,
                parse_error: None,
                token_estimate: TokenEstimate { input: crate::cost::estimate_tokens(&request.prompt), output: 0 },
                duration_ms,
                exit_code: None,
            };
        }
    };

    let token_estimate = TokenEstimate {
        input: crate::cost::estimate_tokens(&request.prompt),
        output: crate::cost::estimate_tokens(&capture.stdout),
    };

    if capture.exit_code != Some(0) {
        debug!(exit_code = ?capture.exit_code, "dispatch: non-zero exit");
        return DispatchResult {
            status: DispatchStatus::Failed,
            output: capture.stdout,
            parsed: None,
            parse_error: Some(capture.stderr),
            token_estimate,
            duration_ms,
            exit_code: capture.exit_code,
        };
    }

    match extract_last_yaml_block(&capture.stdout) {
        Some(yaml_text) => match serde_yaml::from_str::<Value>(&yaml_text) {
            Ok(value) => {
                if let Some(schema) = output_schema {
                    if let Err(e) = validate_against_schema(&value, schema) {
                        return DispatchResult {
                            status: DispatchStatus::Failed,
                            output: capture.stdout,
                            parsed: None,
                            parse_error: Some(e),
                            token_estimate,
                            duration_ms,
                            exit_code: capture.exit_code,
                        };
                    }
                }
                DispatchResult {
                    status: DispatchStatus::Completed,
                    output: capture.stdout,
                    parsed: Some(value),
                    parse_error: None,
                    token_estimate,
                    duration_ms,
                    exit_code: capture.exit_code,
                }
            }
            Err(e) => DispatchResult {
                status: DispatchStatus::Failed,
                output: capture.stdout,
                parsed: None,
                parse_error: Some(format!("invalid YAML block: {e}")),
                token_estimate,
                duration_ms,
                exit_code: capture.exit_code,
            },
        },
        None => DispatchResult {
            status: DispatchStatus::Failed,
            output: capture.stdout,
            parsed: None,
            parse_error: Some("no YAML block found in agent output".to_string()),
            token_estimate,
            duration_ms,
            exit_code: capture.exit_code,
        },
    }
}

/// Structural schema check: every schema key present in the record must be
/// present and non-null in the parsed value. This is intentionally a
/// shallow contract check, not a full JSON Schema validator — §4.F only
/// requires "validates against the schema", and the sub-agent output
/// formats in §6 are shallow record shapes.
fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), String> {
    let Value::Object(schema_fields) = schema else {
        return Ok(());
    };
    let Value::Object(value_fields) = value else {
        return Err("expected a YAML mapping at the top level".to_string());
    };
    for key in schema_fields.keys() {
        if !value_fields.contains_key(key) {
            return Err(format!("missing required field: {key}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_check_flags_missing_fields() {
        let schema = serde_json::json!({"result": null, "product_brief": null});
        let value = serde_json::json!({"result": "success"});
        assert!(validate_against_schema(&value, &schema).is_err());
    }

    #[test]
    fn schema_check_passes_when_all_fields_present() {
        let schema = serde_json::json!({"result": null});
        let value = serde_json::json!({"result": "success", "extra": 1});
        assert!(validate_against_schema(&value, &schema).is_ok());
    }
}
