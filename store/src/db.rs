use std::path::Path;
use std::sync::Mutex;

use tracing::debug;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::filter::Filter;
use crate::migrations::{self, Migration};
use crate::record::Record;

/// Embedded, write-ahead-logged SQLite store.
///
/// A single [`Connection`] guarded by a mutex is used rather than a pool:
/// WAL mode lets concurrent readers proceed while a writer holds the lock,
/// and every writer transaction in this crate is short-lived, so a single
/// serialized writer is sufficient (matches the "writes are serialized,
/// readers never block on writers" contract of the persistence store).
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the database at `path` and run all pending
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Store::open: opening database");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let store = Store { conn: Mutex::new(conn) };
        store.run_migrations(migrations::registry())?;
        Ok(store)
    }

    /// In-memory store for tests; skips disk but still runs migrations.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Store { conn: Mutex::new(conn) };
        store.run_migrations(migrations::registry())?;
        Ok(store)
    }

    /// Apply any migrations in `migrations` not already recorded in
    /// `schema_migrations`, in ascending version order, each inside its own
    /// transaction. Fails fast on the first error, leaving already-applied
    /// migrations committed.
    fn run_migrations(&self, migrations: Vec<Migration>) -> Result<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )",
        )?;

        let applied: std::collections::HashSet<u32> = {
            let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
            stmt.query_map([], |row| row.get::<_, i64>(0))?
                .filter_map(|r| r.ok())
                .map(|v| v as u32)
                .collect()
        };

        for migration in migrations {
            if applied.contains(&migration.version) {
                debug!(version = migration.version, "run_migrations: already applied");
                continue;
            }
            debug!(version = migration.version, name = migration.name, "run_migrations: applying");
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql).map_err(|e| StoreError::Migration {
                version: migration.version,
                name: migration.name,
                source: e,
            })?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![migration.version, migration.name, crate::record::now_ms()],
            )
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                name: migration.name,
                source: e,
            })?;
            tx.commit()?;
        }
        Ok(())
    }

    /// Insert a new record, writing both the JSON blob and its indexed
    /// columns in one statement.
    pub fn insert<T: Record>(&self, record: &T) -> Result<()> {
        let indexed = record.indexed_fields();
        let mut columns = vec!["id".to_string(), "data".to_string(), "updated_at".to_string()];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string(), "?3".to_string()];
        let mut next = 4;
        for (name, _) in &indexed {
            columns.push((*name).to_string());
            placeholders.push(format!("?{next}"));
            next += 1;
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::collection_name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let data = serde_json::to_string(record)?;
        let conn = self.conn.lock().expect("store mutex poisoned");
        let id = record.id();
        let updated_at = record.updated_at();
        let mut params: Vec<&dyn rusqlite::ToSql> =
            vec![&id as &dyn rusqlite::ToSql, &data, &updated_at];
        let values: Vec<_> = indexed.iter().map(|(_, v)| v.clone()).collect();
        for v in &values {
            params.push(v);
        }
        conn.execute(&sql, params.as_slice())?;
        debug!(collection = T::collection_name(), id = record.id(), "Store::insert");
        Ok(())
    }

    /// Overwrite a record's blob and indexed columns in place. Used by
    /// append-only tables' "supersede" pattern (a new row is inserted, then
    /// the superseded row is updated only to set `superseded_by`) and by
    /// mutable entities (`Task`, `Session`) that transition in place.
    pub fn update<T: Record>(&self, record: &T) -> Result<()> {
        let indexed = record.indexed_fields();
        let mut assignments = vec!["data = ?1".to_string(), "updated_at = ?2".to_string()];
        let mut next = 3;
        for (name, _) in &indexed {
            assignments.push(format!("{name} = ?{next}"));
            next += 1;
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{next}",
            T::collection_name(),
            assignments.join(", ")
        );

        let data = serde_json::to_string(record)?;
        let conn = self.conn.lock().expect("store mutex poisoned");
        let updated_at = record.updated_at();
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&data, &updated_at];
        let values: Vec<_> = indexed.iter().map(|(_, v)| v.clone()).collect();
        for v in &values {
            params.push(v);
        }
        let id = record.id();
        params.push(&id);
        let changed = conn.execute(&sql, params.as_slice())?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                collection: T::collection_name(),
                id: record.id().to_string(),
            });
        }
        debug!(collection = T::collection_name(), id = record.id(), "Store::update");
        Ok(())
    }

    pub fn get<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", T::collection_name());
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    pub fn get_required<T: Record>(&self, id: &str) -> Result<T> {
        self.get(id)?.ok_or_else(|| StoreError::NotFound {
            collection: T::collection_name(),
            id: id.to_string(),
        })
    }

    pub fn delete<T: Record>(&self, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", T::collection_name());
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(&sql, rusqlite::params![id])?;
        Ok(())
    }

    /// Query a collection by filter, returning deserialized records in the
    /// filter's declared order (insertion order by `rowid` when
    /// unspecified).
    pub fn query<T: Record>(&self, filter: &Filter) -> Result<Vec<T>> {
        let (where_sql, params) = filter.to_sql();
        let sql = format!(
            "SELECT data FROM {} WHERE {}{}{}",
            T::collection_name(),
            where_sql,
            filter.order_sql(),
            filter.limit_sql()
        );
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(bound.as_slice(), |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn count<T: Record>(&self, filter: &Filter) -> Result<i64> {
        let (where_sql, params) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", T::collection_name(), where_sql);
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&sql)?;
        let bound: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        Ok(stmt.query_row(bound.as_slice(), |row| row.get(0))?)
    }

    /// Execute `f` inside a single transaction. Used where the spec requires
    /// two writes (e.g. task-state transition + cost entry) to commit
    /// atomically.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<R>,
    {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Raw access for queries that don't fit the generic `Record` shape
    /// (the `TaskDependency` join table, derived views).
    pub fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().expect("store mutex poisoned");
        f(&conn)
    }
}
