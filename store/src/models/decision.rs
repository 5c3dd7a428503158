use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

/// An append-only typed choice made during a pipeline run.
///
/// Never mutated in place: to "update" a decision, create a new row with
/// [`Decision::new`] and call `supersede` on the old row to point
/// `superseded_by` at the new id. An active decision has `superseded_by =
/// None`; lookups for "current" decisions filter on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub pipeline_run_id: Option<String>,
    pub phase: String,
    pub category: String,
    pub key: String,
    pub value: String,
    pub rationale: Option<String>,
    pub superseded_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Decision {
    pub fn new(
        pipeline_run_id: Option<String>,
        phase: impl Into<String>,
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            pipeline_run_id,
            phase: phase.into(),
            category: category.into(),
            key: key.into(),
            value: value.into(),
            rationale: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Idempotent: superseding an already-superseded-by-the-same-target
    /// decision is a no-op, matching §4.B.
    pub fn supersede(&mut self, new_id: &str) {
        if self.superseded_by.as_deref() == Some(new_id) {
            return;
        }
        self.superseded_by = Some(new_id.to_string());
        self.updated_at = now_ms();
    }
}

impl Record for Decision {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "decisions"
    }

    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("pipeline_run_id", self.pipeline_run_id.clone().into()),
            ("phase", IndexValue::text(self.phase.clone())),
            ("category", IndexValue::text(self.category.clone())),
            ("key", IndexValue::text(self.key.clone())),
            ("superseded_by", self.superseded_by.clone().into()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supersede_is_idempotent() {
        let mut d = Decision::new(None, "planning", "tech", "db", "SQLite");
        d.supersede("new-id");
        let updated_at_first = d.updated_at;
        d.supersede("new-id");
        assert_eq!(d.updated_at, updated_at_first);
        assert!(!d.is_active());
    }
}
