//! Task graph file parsing (§4.J): format is chosen by extension
//! (`.yml`/`.yaml` -> YAML, `.json` -> JSON, anything else defaults to
//! YAML).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDef {
    pub name: String,
    #[serde(default)]
    pub budget_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    pub prompt: String,
    #[serde(default, rename = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub budget_usd: Option<f64>,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraphFile {
    pub version: String,
    pub session: SessionDef,
    pub tasks: BTreeMap<String, TaskDef>,
}

pub const SUPPORTED_VERSIONS: &[&str] = &["1", "1.0"];

pub fn parse_graph_file(path: &Path) -> Result<TaskGraphFile, CoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| CoreError::TaskGraph(e.to_string()))?;
    parse_graph_text(&text, path.extension().and_then(|e| e.to_str()))
}

pub fn parse_graph_text(text: &str, extension: Option<&str>) -> Result<TaskGraphFile, CoreError> {
    let graph: TaskGraphFile = match extension {
        Some("json") => serde_json::from_str(text).map_err(|e| CoreError::TaskGraph(e.to_string()))?,
        _ => serde_yaml::from_str(text).map_err(|e| CoreError::TaskGraph(e.to_string()))?,
    };

    if !SUPPORTED_VERSIONS.contains(&graph.version.as_str()) {
        return Err(CoreError::TaskGraphIncompatibleFormat {
            found: graph.version.clone(),
            supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
        });
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
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

    #[test]
    fn parses_yaml_graph() {
        let graph = parse_graph_text(YAML, Some("yaml")).unwrap();
        assert_eq!(graph.tasks.len(), 2);
        assert_eq!(graph.tasks["b"].depends_on, vec!["a".to_string()]);
    }

    #[test]
    fn rejects_unsupported_version() {
        let text = YAML.replace("version: \"1\"", "version: \"99\"");
        let err = parse_graph_text(&text, Some("yaml")).unwrap_err();
        assert!(matches!(err, CoreError::TaskGraphIncompatibleFormat { .. }));
    }

    #[test]
    fn defaults_to_yaml_for_unknown_extension() {
        assert!(parse_graph_text(YAML, None).is_ok());
    }
}
