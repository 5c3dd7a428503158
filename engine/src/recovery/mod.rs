//! Crash-Recovery Manager (§4.L): on startup, reconciles any task left in
//! `running` state by a process that died mid-task, reclaims worktrees,
//! and exposes session-level recovery helpers. Idempotent: running it
//! against an already-clean database is a no-op.

use std::sync::Arc;

use substrate_store::models::{Session, SessionStatus, Task, TaskStatus};
use substrate_store::{Filter, Store};
use tracing::{info, warn};

use crate::error::Result;
use crate::worktree::WorktreeManager;

#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed: usize,
    pub worktrees_cleaned: usize,
}

/// Runs the startup reconciliation pass described in §4.L.
pub async fn recover(store: &Store, worktree: &Arc<WorktreeManager>) -> Result<RecoveryReport> {
    let running_tasks: Vec<Task> = store.query(&Filter::new().eq("status", "running"))?;
    let mut report = RecoveryReport::default();

    for mut task in running_tasks {
        if task.retry_or_fail() {
            report.recovered += 1;
            info!(task_id = %task.id, "recovery: task reset to pending for retry");
        } else {
            task.error = Some("crash + retries exhausted".to_string());
            report.failed += 1;
            warn!(task_id = %task.id, "recovery: task marked failed, retries exhausted");
        }
        store.update(&task)?;
    }

    match worktree.cleanup_all_worktrees().await {
        Ok(count) => report.worktrees_cleaned = count,
        Err(e) => warn!(error = %e, "recovery: cleanup_all_worktrees failed, continuing"),
    }

    Ok(report)
}

/// The most-recently-updated `interrupted` session, if one exists.
pub fn find_interrupted_session(store: &Store) -> Result<Option<Session>> {
    let mut candidates: Vec<Session> =
        store.query(&Filter::new().eq("status", "interrupted").order_by("updated_at", false).limit(1))?;
    Ok(candidates.pop())
}

/// Marks a session `abandoned`. Used when an interrupted session should
/// not be resumed.
pub fn archive_session(store: &Store, session_id: &str) -> Result<()> {
    let mut session = store.get_required::<Session>(session_id)?;
    session.set_status(SessionStatus::Abandoned);
    store.update(&session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worktree::WorktreeConfig;

    #[tokio::test]
    async fn recover_resets_retryable_tasks_and_fails_exhausted_ones() {
        let db = Store::open_in_memory().unwrap();
        let session = Session::new("graph.yml", "main");
        db.insert(&session).unwrap();

        let mut retryable = Task::new("t1", &session.id, "t1", "do it").with_max_retries(1);
        retryable.set_status(TaskStatus::Running);
        db.insert(&retryable).unwrap();

        let mut exhausted = Task::new("t2", &session.id, "t2", "do it").with_max_retries(0);
        exhausted.set_status(TaskStatus::Running);
        db.insert(&exhausted).unwrap();

        let worktree = Arc::new(WorktreeManager::new(WorktreeConfig::default()));
        let report = recover(&db, &worktree).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed, 1);

        let t1 = db.get_required::<Task>("t1").unwrap();
        assert_eq!(t1.status, TaskStatus::Pending);
        let t2 = db.get_required::<Task>("t2").unwrap();
        assert_eq!(t2.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn recover_on_clean_db_is_a_no_op() {
        let db = Store::open_in_memory().unwrap();
        let worktree = Arc::new(WorktreeManager::new(WorktreeConfig::default()));
        let report = recover(&db, &worktree).await.unwrap();
        assert_eq!(report.recovered, 0);
        assert_eq!(report.failed, 0);
    }
}
