use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// A produced artifact (plan document, architecture doc, generated file
/// manifest, ...). `path` is opaque and is often a URI into the decision
/// store itself rather than a filesystem path. `content_hash` lets callers
/// detect whether a later artifact with the same `(phase, artifact_type)`
/// actually changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub pipeline_run_id: Option<String>,
    pub phase: String,
    pub artifact_type: String,
    pub path: String,
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Artifact {
    pub fn new(
        pipeline_run_id: Option<String>,
        phase: impl Into<String>,
        artifact_type: impl Into<String>,
        path: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            pipeline_run_id,
            phase: phase.into(),
            artifact_type: artifact_type.into(),
            path: path.into(),
            content_hash: content_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Artifact {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
    fn collection_name() -> &'static str {
        "artifacts"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("pipeline_run_id", self.pipeline_run_id.clone().into()),
            ("phase", IndexValue::text(self.phase.clone())),
            ("artifact_type", IndexValue::text(self.artifact_type.clone())),
        ]
    }
}
