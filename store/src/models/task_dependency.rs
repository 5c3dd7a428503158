use crate::db::Store;
use crate::error::Result;

/// `(task_id, depends_on)` edges of the task graph. Modeled as a plain join
/// table rather than a [`crate::record::Record`] collection: it has no
/// standalone identity, only a uniqueness constraint on the pair, enforced
/// by the table's composite primary key (migration version 4).
impl Store {
    pub fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on) VALUES (?1, ?2)",
                rusqlite::params![task_id, depends_on],
            )?;
            Ok(())
        })
    }

    pub fn dependencies_of(&self, task_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT depends_on FROM task_dependencies WHERE task_id = ?1")?;
            let rows = stmt.query_map(rusqlite::params![task_id], |row| row.get(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn dependents_of(&self, task_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT task_id FROM task_dependencies WHERE depends_on = ?1")?;
            let rows = stmt.query_map(rusqlite::params![task_id], |row| row.get(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn all_dependencies_for_session(&self, session_id: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT td.task_id, td.depends_on FROM task_dependencies td
                 JOIN tasks t ON t.id = td.task_id
                 WHERE t.session_id = ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![session_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }
}
