//! Signal Bus (§4.M): `pause`/`resume`/`cancel` requests queued in the
//! `session_signals` table and polled by the orchestrator between engine
//! ticks. Avoids needing IPC between a CLI invocation and the (possibly
//! different-process) running orchestrator.

use substrate_store::models::{Session, SessionSignal, SessionStatus, Signal};
use substrate_store::{Filter, FilterOp, IndexValue, Store};
use tracing::info;

use crate::error::Result;

/// Inserts a pending signal row; the CLI's `pause`/`resume`/`cancel`
/// subcommands call this directly.
pub fn request(store: &Store, session_id: &str, signal: Signal) -> Result<()> {
    let row = SessionSignal::new(session_id, signal);
    store.insert(&row)?;
    Ok(())
}

/// Applies every unprocessed signal for `session_id`, in insertion order,
/// and stamps `processed_at` on each. Returns the last signal applied, if
/// any, so the caller's tick loop can react immediately (e.g. halt on
/// `cancel` rather than waiting for the next poll).
pub fn poll_and_apply(store: &Store, session_id: &str) -> Result<Option<Signal>> {
    let pending: Vec<SessionSignal> = store.query(
        &Filter::new()
            .eq("session_id", session_id)
            .op("processed_at", FilterOp::IsNull, IndexValue::Null)
            .order_by("created_at", true),
    )?;

    let mut last = None;
    for mut row in pending {
        apply(store, session_id, row.signal)?;
        row.mark_processed();
        store.update(&row)?;
        last = Some(row.signal);
    }
    Ok(last)
}

fn apply(store: &Store, session_id: &str, signal: Signal) -> Result<()> {
    let mut session = store.get_required::<Session>(session_id)?;
    match signal {
        Signal::Pause => {
            session.set_status(SessionStatus::Paused);
            info!(session_id, "signal: paused");
        }
        Signal::Resume => {
            session.set_status(SessionStatus::Active);
            info!(session_id, "signal: resumed");
        }
        Signal::Cancel => {
            session.set_status(SessionStatus::Failed);
            info!(session_id, "signal: cancelled");
        }
    }
    store.update(&session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_and_apply_processes_signals_in_order_and_marks_them() {
        let db = Store::open_in_memory().unwrap();
        let session = Session::new("graph.yml", "main");
        db.insert(&session).unwrap();

        request(&db, &session.id, Signal::Pause).unwrap();
        let applied = poll_and_apply(&db, &session.id).unwrap();
        assert_eq!(applied, Some(Signal::Pause));

        let updated = db.get_required::<Session>(&session.id).unwrap();
        assert_eq!(updated.status, SessionStatus::Paused);

        assert_eq!(poll_and_apply(&db, &session.id).unwrap(), None);
    }
}
