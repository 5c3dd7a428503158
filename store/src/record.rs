use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::IndexValue;

/// Milliseconds since the Unix epoch, used for every `created_at`/`updated_at`
/// column. A single free function keeps timestamp generation in one place so
/// row creation is monotonic per-process.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// A domain type persistable through [`crate::db::Store`].
///
/// Each implementor maps to exactly one SQLite table (its `collection_name`).
/// The full record round-trips through `serde_json` into a `data` blob
/// column; `indexed_fields` promotes a subset of fields to real columns so
/// [`crate::filter::Filter`] queries can use a SQL index instead of a table
/// scan + deserialize-and-check.
pub trait Record: serde::Serialize + serde::de::DeserializeOwned + Clone {
    fn id(&self) -> &str;
    fn updated_at(&self) -> i64;
    fn collection_name() -> &'static str;

    /// Column name -> current value, for every field the collection indexes.
    /// Must be stable across calls for a given record: the column set is
    /// fixed at collection-creation time from this method's key set.
    fn indexed_fields(&self) -> Vec<(&'static str, IndexValue)>;
}
