//! Event bus: a single broadcast channel per orchestrator instance (§9
//! "Cross-module coupling via events"). Every component that wants to
//! observe activity subscribes; nothing awaits a subscriber's drain
//! (§9 "Streaming stdout emission" — fire-and-forget, no backpressure).

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{Envelope, Event};

/// ~100 events/second sustained for ~100 seconds before the slowest
/// subscriber starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget: a channel with no subscribers, or one at capacity
    /// with a lagging subscriber, never blocks or errors the caller.
    pub fn emit(&self, event: Event) {
        debug!(event = event.name(), session_id = event.session_id(), "EventBus::emit");
        let _ = self.tx.send(Envelope::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emitter_for(&self, session_id: impl Into<String>) -> EventEmitter {
        EventEmitter { tx: self.tx.clone(), session_id: session_id.into() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

/// Convenience handle bound to one session id, so call sites don't repeat
/// it on every emission.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<Envelope>,
    session_id: String,
}

impl EventEmitter {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(Envelope::new(event));
    }

    pub fn pipeline_start(&self, run_id: &str, pack: &str, phases: &[String]) {
        self.emit(Event::PipelineStart {
            session_id: self.session_id.clone(),
            run_id: run_id.to_string(),
            pack: pack.to_string(),
            phases: phases.to_vec(),
        });
    }

    pub fn pipeline_complete(&self, run_id: &str, status: &str, total_cost_usd: f64) {
        self.emit(Event::PipelineComplete {
            session_id: self.session_id.clone(),
            run_id: run_id.to_string(),
            status: status.to_string(),
            total_cost_usd,
        });
    }

    pub fn pipeline_heartbeat(&self, run_id: &str) {
        self.emit(Event::PipelineHeartbeat { session_id: self.session_id.clone(), run_id: run_id.to_string() });
    }

    pub fn story_phase(&self, phase: &str, index: usize, total: usize) {
        self.emit(Event::StoryPhase { session_id: self.session_id.clone(), phase: phase.to_string(), index, total });
    }

    pub fn story_done(&self, phase: &str, summary: &str) {
        self.emit(Event::StoryDone {
            session_id: self.session_id.clone(),
            phase: phase.to_string(),
            summary: summary.to_string(),
        });
    }

    pub fn story_escalation(&self, phase: &str, reason: &str) {
        self.emit(Event::StoryEscalation {
            session_id: self.session_id.clone(),
            phase: phase.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn story_warn(&self, phase: &str, message: &str) {
        self.emit(Event::StoryWarn {
            session_id: self.session_id.clone(),
            phase: phase.to_string(),
            message: message.to_string(),
        });
    }

    pub fn story_log(&self, phase: &str, message: &str) {
        self.emit(Event::StoryLog {
            session_id: self.session_id.clone(),
            phase: phase.to_string(),
            message: message.to_string(),
        });
    }

    pub fn story_stall(&self, phase: &str, reason: &str) {
        self.emit(Event::StoryStall {
            session_id: self.session_id.clone(),
            phase: phase.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn status_snapshot(&self, pending: usize, running: usize, completed: usize, failed: usize, cost_usd: f64) {
        self.emit(Event::StatusSnapshot {
            session_id: self.session_id.clone(),
            tasks_pending: pending,
            tasks_running: running,
            tasks_completed: completed,
            tasks_failed: failed,
            cost_usd,
        });
    }

    pub fn cost_recorded(&self, task_id: Option<&str>, provider: &str, model: &str, cost_usd: f64, savings_usd: f64) {
        self.emit(Event::CostRecorded {
            session_id: self.session_id.clone(),
            task_id: task_id.map(str::to_string),
            provider: provider.to_string(),
            model: model.to_string(),
            cost_usd,
            savings_usd,
        });
    }

    pub fn task_started(&self, task_id: &str, agent: &str) {
        self.emit(Event::TaskStarted {
            session_id: self.session_id.clone(),
            task_id: task_id.to_string(),
            agent: agent.to_string(),
        });
    }

    pub fn task_complete(&self, task_id: &str) {
        self.emit(Event::TaskComplete { session_id: self.session_id.clone(), task_id: task_id.to_string() });
    }

    pub fn task_failed(&self, task_id: &str, error: &str) {
        self.emit(Event::TaskFailed {
            session_id: self.session_id.clone(),
            task_id: task_id.to_string(),
            error: error.to_string(),
        });
    }

    pub fn budget_warning(&self, current: f64, limit: f64) {
        self.emit(Event::BudgetWarning { session_id: self.session_id.clone(), current, limit });
    }

    pub fn budget_exceeded(&self, current: f64, limit: f64) {
        self.emit(Event::BudgetExceeded { session_id: self.session_id.clone(), current, limit });
    }

    pub fn worktree_created(&self, task_id: &str, path: &str) {
        self.emit(Event::WorktreeCreated {
            session_id: self.session_id.clone(),
            task_id: task_id.to_string(),
            path: path.to_string(),
        });
    }

    pub fn worktree_merged(&self, task_id: &str) {
        self.emit(Event::WorktreeMerged { session_id: self.session_id.clone(), task_id: task_id.to_string() });
    }

    pub fn worktree_conflict(&self, task_id: &str, conflicting_files: &[String]) {
        self.emit(Event::WorktreeConflict {
            session_id: self.session_id.clone(),
            task_id: task_id.to_string(),
            conflicting_files: conflicting_files.to_vec(),
        });
    }

    pub fn worktree_removed(&self, task_id: &str) {
        self.emit(Event::WorktreeRemoved { session_id: self.session_id.clone(), task_id: task_id.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subscribers_does_not_panic_or_block() {
        let bus = EventBus::new(8);
        bus.emit(Event::TaskStarted {
            session_id: "s".to_string(),
            task_id: "t".to_string(),
            agent: "claude".to_string(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.emit(Event::TaskComplete { session_id: "s1".to_string(), task_id: "t1".to_string() });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.name(), "task:complete");
        assert_eq!(envelope.event.session_id(), "s1");
    }

    #[tokio::test]
    async fn emitter_binds_session_id_across_calls() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("sess-42");
        emitter.task_started("t1", "claude");
        emitter.task_complete("t1");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event.session_id(), "sess-42");
        assert_eq!(second.event.session_id(), "sess-42");
        assert_eq!(first.event.name(), "task:started");
        assert_eq!(second.event.name(), "task:complete");
    }

    #[test]
    fn subscriber_count_tracks_live_subscriptions() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
