//! Database schema migrations.
//!
//! Applies the schema for the categories, tasks, tags, and task_tags
//! tables plus the schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use todo_core::error::TodoError;

/// Run all pending database migrations.
///
/// Version 1 is the initial schema. Later migrations check the current
/// version and apply incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), TodoError> {
    // Create the migrations tracking table first.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| TodoError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = schema_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, TodoError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| TodoError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), TodoError> {
    conn.execute_batch(
        "
        -- Optional single classification per task.
        CREATE TABLE IF NOT EXISTS categories (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL CHECK (length(name) > 0),
            color   TEXT NOT NULL
        );

        -- To-do items. Times are unix milliseconds.
        CREATE TABLE IF NOT EXISTS tasks (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            title           TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            is_completed    INTEGER NOT NULL DEFAULT 0
                            CHECK (is_completed IN (0, 1)),
            category_id     INTEGER
                            REFERENCES categories(id) ON DELETE SET NULL,
            created_at      INTEGER NOT NULL,
            deadline        INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status
            ON tasks (is_completed, id DESC);

        CREATE INDEX IF NOT EXISTS idx_tasks_deadline
            ON tasks (deadline)
            WHERE deadline IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_tasks_category
            ON tasks (category_id)
            WHERE category_id IS NOT NULL;

        -- Labels; the application treats the name as the identity.
        CREATE TABLE IF NOT EXISTS tags (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            name    TEXT NOT NULL CHECK (length(name) > 0)
        );

        CREATE INDEX IF NOT EXISTS idx_tags_name
            ON tags (name);

        -- Many-to-many join between tasks and tags.
        CREATE TABLE IF NOT EXISTS task_tags (
            task_id     INTEGER NOT NULL
                        REFERENCES tasks(id) ON DELETE CASCADE,
            tag_id      INTEGER NOT NULL
                        REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (task_id, tag_id)
        );

        CREATE INDEX IF NOT EXISTS idx_task_tags_tag
            ON task_tags (tag_id);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| TodoError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        assert_eq!(schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_task_id_autoincrements() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO tasks (title, created_at) VALUES ('first', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tasks (title, created_at) VALUES ('second', 0)",
            [],
        )
        .unwrap();

        let max_id: i64 = conn
            .query_row("SELECT MAX(id) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(max_id, 2);
    }

    #[test]
    fn test_task_tags_composite_key() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO tasks (id, title, created_at) VALUES (1, 't', 0)", [])
            .unwrap();
        conn.execute("INSERT INTO tags (id, name) VALUES (1, 'Work')", [])
            .unwrap();
        conn.execute("INSERT INTO task_tags (task_id, tag_id) VALUES (1, 1)", [])
            .unwrap();

        let duplicate = conn.execute("INSERT INTO task_tags (task_id, tag_id) VALUES (1, 1)", []);
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_task_tags_require_existing_rows() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute("INSERT INTO task_tags (task_id, tag_id) VALUES (5, 5)", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_category_delete_sets_null() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO categories (id, name, color) VALUES (1, 'Work', '#FF6B6B')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tasks (id, title, category_id, created_at) VALUES (1, 't', 1, 0)",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM categories WHERE id = 1", []).unwrap();

        let category: Option<i64> = conn
            .query_row("SELECT category_id FROM tasks WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(category, None);
    }

    #[test]
    fn test_completion_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO tasks (title, is_completed, created_at) VALUES ('bad', 2, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
