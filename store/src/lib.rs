//! Embedded, write-ahead-logged SQLite persistence for the orchestrator.
//!
//! Every domain entity implements [`Record`] and is persisted into its own
//! table as an indexed-column-plus-JSON-blob row, in the shape the wider
//! workspace's generic collection store uses. On top of that generic layer
//! sits [`DecisionStore`], the typed API over the six append-only pipeline
//! tables, and [`views`], the two read-only derived views the task-graph
//! engine and cost reporting depend on.

pub mod db;
pub mod decision_store;
pub mod error;
pub mod filter;
pub mod migrations;
pub mod models;
pub mod record;
pub mod value;
pub mod views;

pub use db::Store;
pub use decision_store::DecisionStore;
pub use error::{Result, StoreError};
pub use filter::{Filter, FilterClause, FilterOp};
pub use record::{Record, now_ms};
pub use value::IndexValue;
