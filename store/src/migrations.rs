/// One ordered, idempotent schema change. `sql` must be safe to run inside a
/// transaction and is recorded in `schema_migrations` on success.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// The full ordered list of migrations. Numbered and applied in order;
/// never edit an already-released migration's `sql` — add a new one.
pub fn registry() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "pipeline_runs",
            sql: "CREATE TABLE pipeline_runs (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                parent_run_id TEXT,
                current_phase TEXT
            );
            CREATE INDEX idx_pipeline_runs_parent ON pipeline_runs(parent_run_id);",
        },
        Migration {
            version: 2,
            name: "decisions",
            sql: "CREATE TABLE decisions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                pipeline_run_id TEXT,
                phase TEXT NOT NULL,
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                superseded_by TEXT
            );
            CREATE INDEX idx_decisions_run_phase ON decisions(pipeline_run_id, phase);
            CREATE INDEX idx_decisions_active ON decisions(pipeline_run_id, superseded_by);",
        },
        Migration {
            version: 3,
            name: "requirements_constraints_artifacts",
            sql: "CREATE TABLE requirements (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                pipeline_run_id TEXT,
                phase TEXT NOT NULL
            );
            CREATE TABLE constraints (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                pipeline_run_id TEXT,
                phase TEXT NOT NULL
            );
            CREATE TABLE artifacts (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                pipeline_run_id TEXT,
                phase TEXT NOT NULL,
                artifact_type TEXT NOT NULL,
                content_hash TEXT NOT NULL
            );
            CREATE INDEX idx_artifacts_lookup ON artifacts(pipeline_run_id, phase, artifact_type);",
        },
        Migration {
            version: 4,
            name: "sessions_tasks",
            sql: "CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                status TEXT NOT NULL
            );
            CREATE TABLE tasks (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                session_id TEXT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE INDEX idx_tasks_session_status ON tasks(session_id, status);
            CREATE TABLE task_dependencies (
                task_id TEXT NOT NULL,
                depends_on TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on),
                CHECK (task_id != depends_on)
            );
            CREATE INDEX idx_task_deps_depends_on ON task_dependencies(depends_on);",
        },
        Migration {
            version: 5,
            name: "cost_entries_session_signals",
            sql: "CREATE TABLE cost_entries (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                session_id TEXT NOT NULL,
                task_id TEXT,
                billing_mode TEXT NOT NULL
            );
            CREATE INDEX idx_cost_entries_session ON cost_entries(session_id);
            CREATE TABLE session_signals (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                session_id TEXT NOT NULL,
                processed_at INTEGER
            );
            CREATE INDEX idx_session_signals_pending ON session_signals(session_id, processed_at);",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_versions_are_ordered_and_unique() {
        let migrations = registry();
        let mut prev = 0;
        for m in &migrations {
            assert!(m.version > prev, "migrations must be strictly increasing");
            prev = m.version;
        }
    }
}
