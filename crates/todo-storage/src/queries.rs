//! Read-side queries over the task store.
//!
//! Plain functions over a borrowed connection so they run the same way
//! inside a one-shot read, a live query refresh, or a write transaction.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ToSql;
use rusqlite::Connection;

use todo_core::error::TodoError;
use todo_core::types::{
    Category, CategoryId, SortOrder, Tag, TagId, Task, TaskId, TaskStats, TaskStatus,
};

use crate::db::Table;

const TASK_COLUMNS: &str =
    "id, title, description, is_completed, category_id, created_at, deadline";

/// A task listing that can be run once or kept live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskQuery {
    /// Every task in one completion partition.
    ByStatus { status: TaskStatus, order: SortOrder },
    /// Tasks in one partition whose title contains `text`.
    Search {
        status: TaskStatus,
        text: String,
        order: SortOrder,
    },
    /// Tasks of any status with a deadline at or after `from`, soonest first.
    DueFrom { from: DateTime<Utc> },
}

impl TaskQuery {
    pub fn active(order: SortOrder) -> Self {
        TaskQuery::ByStatus {
            status: TaskStatus::Active,
            order,
        }
    }

    pub fn completed(order: SortOrder) -> Self {
        TaskQuery::ByStatus {
            status: TaskStatus::Completed,
            order,
        }
    }

    pub fn search(status: TaskStatus, text: impl Into<String>, order: SortOrder) -> Self {
        TaskQuery::Search {
            status,
            text: text.into(),
            order,
        }
    }

    pub fn due_from(from: DateTime<Utc>) -> Self {
        TaskQuery::DueFrom { from }
    }

    /// Tables whose writes can change the result.
    pub fn tables(&self) -> &'static [Table] {
        &[Table::Tasks]
    }

    pub fn run(&self, conn: &Connection) -> Result<Vec<Task>, TodoError> {
        match self {
            TaskQuery::ByStatus { status, order } => tasks_by_status(conn, *status, *order),
            TaskQuery::Search {
                status,
                text,
                order,
            } => {
                let needle = text.trim();
                let tasks = tasks_by_status(conn, *status, *order)?;
                if needle.is_empty() {
                    return Ok(tasks);
                }
                Ok(tasks
                    .into_iter()
                    .filter(|task| title_matches(&task.title, needle))
                    .collect())
            }
            TaskQuery::DueFrom { from } => select_tasks(
                conn,
                &format!(
                    "SELECT {} FROM tasks
                     WHERE deadline IS NOT NULL AND deadline >= ?1
                     ORDER BY deadline ASC, id ASC",
                    TASK_COLUMNS
                ),
                &[&from.timestamp_millis()],
            ),
        }
    }
}

/// Case-insensitive substring match. Never interprets wildcards.
pub fn title_matches(title: &str, needle: &str) -> bool {
    title.to_lowercase().contains(&needle.to_lowercase())
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Newest => "id DESC",
        SortOrder::Title => "title ASC, id ASC",
        // Tasks without a deadline go last.
        SortOrder::Deadline => "deadline IS NULL, deadline ASC, id ASC",
    }
}

// ============================================================================
// Tasks
// ============================================================================

pub fn tasks_by_status(
    conn: &Connection,
    status: TaskStatus,
    order: SortOrder,
) -> Result<Vec<Task>, TodoError> {
    select_tasks(
        conn,
        &format!(
            "SELECT {} FROM tasks WHERE is_completed = ?1 ORDER BY {}",
            TASK_COLUMNS,
            order_clause(order)
        ),
        &[&status.is_completed()],
    )
}

/// Active tasks due within `[from, to]`, soonest first.
pub fn active_tasks_due_between(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Task>, TodoError> {
    select_tasks(
        conn,
        &format!(
            "SELECT {} FROM tasks
             WHERE is_completed = 0 AND deadline IS NOT NULL
               AND deadline >= ?1 AND deadline <= ?2
             ORDER BY deadline ASC, id ASC",
            TASK_COLUMNS
        ),
        &[&from.timestamp_millis(), &to.timestamp_millis()],
    )
}

pub fn find_task(conn: &Connection, id: TaskId) -> Result<Option<Task>, TodoError> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        rusqlite::params![id.0],
        |row| Ok(row_to_task(row)),
    )
    .optional()
    .map_err(|e| TodoError::Storage(format!("Failed to load task {}: {}", id, e)))?
    .transpose()
}

pub fn task_stats(conn: &Connection) -> Result<TaskStats, TodoError> {
    conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN is_completed = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN is_completed = 1 THEN 1 ELSE 0 END), 0)
         FROM tasks",
        [],
        |row| {
            Ok(TaskStats {
                active: row.get::<_, i64>(0)? as u64,
                completed: row.get::<_, i64>(1)? as u64,
            })
        },
    )
    .map_err(|e| TodoError::Storage(format!("Failed to count tasks: {}", e)))
}

fn select_tasks(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Task>, TodoError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| TodoError::Storage(format!("Failed to prepare task query: {}", e)))?;

    let rows = stmt
        .query_map(params, |row| Ok(row_to_task(row)))
        .map_err(|e| TodoError::Storage(format!("Failed to query tasks: {}", e)))?;

    let mut tasks = Vec::new();
    for row in rows {
        let task = row.map_err(|e| TodoError::Storage(e.to_string()))??;
        tasks.push(task);
    }
    Ok(tasks)
}

// ============================================================================
// Tags
// ============================================================================

pub fn all_tags(conn: &Connection) -> Result<Vec<Tag>, TodoError> {
    select_tags(conn, "SELECT id, name FROM tags ORDER BY id", &[])
}

pub fn tags_for_task(conn: &Connection, task_id: TaskId) -> Result<Vec<Tag>, TodoError> {
    select_tags(
        conn,
        "SELECT tags.id, tags.name FROM tags
         INNER JOIN task_tags ON tags.id = task_tags.tag_id
         WHERE task_tags.task_id = ?1
         ORDER BY tags.id",
        &[&task_id.0],
    )
}

pub fn find_tag(conn: &Connection, id: TagId) -> Result<Option<Tag>, TodoError> {
    conn.query_row(
        "SELECT id, name FROM tags WHERE id = ?1",
        rusqlite::params![id.0],
        |row| {
            Ok(Tag {
                id: TagId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| TodoError::Storage(format!("Failed to load tag {}: {}", id, e)))
}

/// First tag carrying exactly `name`.
pub fn find_tag_by_name(conn: &Connection, name: &str) -> Result<Option<Tag>, TodoError> {
    conn.query_row(
        "SELECT id, name FROM tags WHERE name = ?1 ORDER BY id LIMIT 1",
        rusqlite::params![name],
        |row| {
            Ok(Tag {
                id: TagId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| TodoError::Storage(format!("Failed to look up tag '{}': {}", name, e)))
}

pub fn tag_ids_for_task(conn: &Connection, task_id: TaskId) -> Result<Vec<TagId>, TodoError> {
    let mut stmt = conn
        .prepare("SELECT tag_id FROM task_tags WHERE task_id = ?1 ORDER BY tag_id")
        .map_err(|e| TodoError::Storage(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![task_id.0], |row| row.get(0).map(TagId))
        .map_err(|e| TodoError::Storage(format!("Failed to query task tags: {}", e)))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TodoError::Storage(e.to_string()))
}

fn select_tags(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Tag>, TodoError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| TodoError::Storage(format!("Failed to prepare tag query: {}", e)))?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(Tag {
                id: TagId(row.get(0)?),
                name: row.get(1)?,
            })
        })
        .map_err(|e| TodoError::Storage(format!("Failed to query tags: {}", e)))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TodoError::Storage(e.to_string()))
}

// ============================================================================
// Categories
// ============================================================================

pub fn all_categories(conn: &Connection) -> Result<Vec<Category>, TodoError> {
    let mut stmt = conn
        .prepare("SELECT id, name, color FROM categories ORDER BY id")
        .map_err(|e| TodoError::Storage(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Category {
                id: CategoryId(row.get(0)?),
                name: row.get(1)?,
                color: row.get(2)?,
            })
        })
        .map_err(|e| TodoError::Storage(format!("Failed to query categories: {}", e)))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TodoError::Storage(e.to_string()))
}

pub fn category_exists(conn: &Connection, id: CategoryId) -> Result<bool, TodoError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
        rusqlite::params![id.0],
        |row| row.get(0),
    )
    .map_err(|e| TodoError::Storage(format!("Failed to look up category {}: {}", id, e)))
}

// ============================================================================
// Row conversion
// ============================================================================

pub(crate) fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, TodoError> {
    let id: i64 = row.get(0).map_err(|e| TodoError::Storage(e.to_string()))?;
    let title: String = row.get(1).map_err(|e| TodoError::Storage(e.to_string()))?;
    let description: String = row.get(2).map_err(|e| TodoError::Storage(e.to_string()))?;
    let is_completed: bool = row.get(3).map_err(|e| TodoError::Storage(e.to_string()))?;
    let category_id: Option<i64> = row.get(4).map_err(|e| TodoError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(5).map_err(|e| TodoError::Storage(e.to_string()))?;
    let deadline: Option<i64> = row.get(6).map_err(|e| TodoError::Storage(e.to_string()))?;

    Ok(Task {
        id: TaskId(id),
        title,
        description,
        is_completed,
        category_id: category_id.map(CategoryId),
        created_at: from_millis(created_at),
        deadline: deadline.map(from_millis),
    })
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

/// Extension trait for rusqlite to support optional query results.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
