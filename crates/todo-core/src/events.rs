use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CategoryId, TagId, TaskId};

/// Change notifications emitted by the repository after a successful write.
///
/// Events are consumed by:
/// - External refresh hooks (the home-screen widget feed)
/// - The broadcast channel (for any in-process listener)
/// - The log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChangeEvent {
    // =========================================================================
    // Task Events
    // =========================================================================
    /// A task row was inserted.
    TaskInserted {
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },

    /// A task's fields were rewritten.
    TaskUpdated {
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },

    /// A task's completion flag changed.
    TaskCompletionChanged {
        task_id: TaskId,
        is_completed: bool,
        timestamp: DateTime<Utc>,
    },

    /// A task was deleted (its associations went with it).
    TaskDeleted {
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },

    /// Every task was removed.
    TasksCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// A task's tag set was replaced.
    TaskTagsReplaced {
        task_id: TaskId,
        tag_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Tasks were inserted from a JSON export.
    TasksImported {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The database file was replaced by a snapshot.
    DatabaseRestored {
        source: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Tag / Category Events
    // =========================================================================
    /// A tag was created.
    TagInserted {
        tag_id: TagId,
        timestamp: DateTime<Utc>,
    },

    /// A tag was deleted along with its associations.
    TagDeleted {
        tag_id: TagId,
        timestamp: DateTime<Utc>,
    },

    /// A category was created or renamed/recolored.
    CategorySaved {
        category_id: CategoryId,
        timestamp: DateTime<Utc>,
    },

    /// A category was deleted; dependent tasks lost their reference.
    CategoryDeleted {
        category_id: CategoryId,
        timestamp: DateTime<Utc>,
    },
}

impl ChangeEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChangeEvent::TaskInserted { timestamp, .. }
            | ChangeEvent::TaskUpdated { timestamp, .. }
            | ChangeEvent::TaskCompletionChanged { timestamp, .. }
            | ChangeEvent::TaskDeleted { timestamp, .. }
            | ChangeEvent::TasksCleared { timestamp, .. }
            | ChangeEvent::TaskTagsReplaced { timestamp, .. }
            | ChangeEvent::TasksImported { timestamp, .. }
            | ChangeEvent::DatabaseRestored { timestamp, .. }
            | ChangeEvent::TagInserted { timestamp, .. }
            | ChangeEvent::TagDeleted { timestamp, .. }
            | ChangeEvent::CategorySaved { timestamp, .. }
            | ChangeEvent::CategoryDeleted { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a snake_case name for the event.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChangeEvent::TaskInserted { .. } => "task_inserted",
            ChangeEvent::TaskUpdated { .. } => "task_updated",
            ChangeEvent::TaskCompletionChanged { .. } => "task_completion_changed",
            ChangeEvent::TaskDeleted { .. } => "task_deleted",
            ChangeEvent::TasksCleared { .. } => "tasks_cleared",
            ChangeEvent::TaskTagsReplaced { .. } => "task_tags_replaced",
            ChangeEvent::TasksImported { .. } => "tasks_imported",
            ChangeEvent::DatabaseRestored { .. } => "database_restored",
            ChangeEvent::TagInserted { .. } => "tag_inserted",
            ChangeEvent::TagDeleted { .. } => "tag_deleted",
            ChangeEvent::CategorySaved { .. } => "category_saved",
            ChangeEvent::CategoryDeleted { .. } => "category_deleted",
        }
    }

    /// Whether the event changed data a task listing shows.
    ///
    /// Creating a tag does not; deleting one strips it from tasks.
    pub fn affects_tasks(&self) -> bool {
        !matches!(
            self,
            ChangeEvent::TagInserted { .. } | ChangeEvent::CategorySaved { .. }
        )
    }
}
