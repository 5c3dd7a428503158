use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

/// A scalar value used in an indexed column, either as stored data or as a
/// filter operand. Kept narrow (no floats) because every indexed field in
/// the data model is an id, a status tag, a timestamp, or a count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl IndexValue {
    pub fn text(s: impl Into<String>) -> Self {
        IndexValue::Text(s.into())
    }
}

impl ToSql for IndexValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            IndexValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            IndexValue::Int(i) => ToSqlOutput::from(*i),
            IndexValue::Bool(b) => ToSqlOutput::from(*b as i64),
            IndexValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
        })
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        IndexValue::Text(s.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        IndexValue::Text(s)
    }
}

impl From<i64> for IndexValue {
    fn from(i: i64) -> Self {
        IndexValue::Int(i)
    }
}

impl From<bool> for IndexValue {
    fn from(b: bool) -> Self {
        IndexValue::Bool(b)
    }
}

impl<T: Into<IndexValue>> From<Option<T>> for IndexValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => IndexValue::Null,
        }
    }
}
