//! NDJSON sink: drains the event bus and writes one JSON object per line
//! to a sink (typically stdout), per §6 "NDJSON event stream". Emission is
//! fire-and-forget — write errors are swallowed and never propagated back
//! into the pipeline (§9 "Streaming stdout emission").

use std::io::Write;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::bus::EventBus;

/// Drains `bus` until the channel closes, writing one NDJSON line per
/// event to `sink`. A write failure is logged and the loop continues;
/// it never aborts the caller.
pub async fn run_ndjson_sink(bus: Arc<EventBus>, mut sink: impl Write + Send) {
    debug!("run_ndjson_sink: starting");
    let mut rx = bus.subscribe();
    // Drop our own handle so the channel can actually reach `Closed` once
    // every other `Arc<EventBus>`/`EventEmitter` goes away; holding it for
    // the loop's lifetime would make this task the last sender forever.
    drop(bus);
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                if let Err(e) = write_line(&mut sink, &envelope) {
                    warn!(error = %e, "run_ndjson_sink: failed to write event, continuing");
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "run_ndjson_sink: lagged behind, missed events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("run_ndjson_sink: bus closed, shutting down");
                break;
            }
        }
    }
}

fn write_line(sink: &mut impl Write, envelope: &super::types::Envelope) -> std::io::Result<()> {
    let json = serde_json::to_string(envelope)?;
    writeln!(sink, "{json}")?;
    sink.flush()
}

/// Spawns [`run_ndjson_sink`] writing to stdout as a background task.
pub fn spawn_stdout_sink(bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { run_ndjson_sink(bus, std::io::stdout()).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::Event;

    #[tokio::test]
    async fn writes_one_ndjson_line_per_event() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let mut buf = Vec::new();

        bus.emit(Event::TaskFailed {
            session_id: "s1".to_string(),
            task_id: "t2".to_string(),
            error: "boom".to_string(),
        });

        let envelope = rx.recv().await.unwrap();
        write_line(&mut buf, &envelope).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["event"], "task:failed");
        assert!(parsed["ts"].is_i64());
    }

    #[tokio::test]
    async fn sink_exits_cleanly_when_bus_dropped() {
        let bus = Arc::new(EventBus::new(8));
        let handle = spawn_stdout_sink(bus.clone());
        drop(bus);
        handle.await.unwrap();
    }
}
