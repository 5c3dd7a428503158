use serde::{Deserialize, Serialize};

use crate::record::{Record, now_ms};
use crate::value::IndexValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Pause,
    Resume,
    Cancel,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Pause => "pause",
            Signal::Resume => "resume",
            Signal::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// A pause/resume/cancel request queued for the running orchestrator.
/// Consumed exactly once: the orchestrator polls unprocessed rows between
/// engine ticks and stamps `processed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSignal {
    pub id: String,
    pub session_id: String,
    pub signal: Signal,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

impl SessionSignal {
    pub fn new(session_id: impl Into<String>, signal: Signal) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            signal,
            created_at: now_ms(),
            processed_at: None,
        }
    }

    pub fn mark_processed(&mut self) {
        self.processed_at = Some(now_ms());
    }
}

impl Record for SessionSignal {
    fn id(&self) -> &str {
        &self.id
    }
    fn updated_at(&self) -> i64 {
        self.processed_at.unwrap_or(self.created_at)
    }
    fn collection_name() -> &'static str {
        "session_signals"
    }
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)> {
        vec![
            ("session_id", IndexValue::text(self.session_id.clone())),
            ("processed_at", self.processed_at.into()),
        ]
    }
}
