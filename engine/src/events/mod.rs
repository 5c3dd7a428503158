//! Event bus for live observability (§6 "NDJSON event stream", §9
//! "Cross-module coupling via events"). Every module that changes
//! orchestrator-visible state emits onto a single per-run [`EventBus`];
//! the bus is a broadcast channel so any number of subscribers (an
//! NDJSON stdout sink, a future TUI, a test harness) can observe the
//! same stream without coupling producers to a particular consumer.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{run_ndjson_sink, spawn_stdout_sink};
pub use types::{Envelope, Event};
