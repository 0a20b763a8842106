use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Row identity of a task. Assigned by the store, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

/// Row identity of a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

/// Row identity of a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Completion partition a task belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet completed.
    #[default]
    Active,
    /// Checked off.
    Completed,
}

impl TaskStatus {
    /// Value of the `is_completed` column for this partition.
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

/// Ordering applied to task listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Identity descending, newest task first.
    #[default]
    Newest,
    /// Title ascending.
    Title,
    /// Deadline ascending. Tasks without a deadline sort last.
    Deadline,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "id" => Ok(SortOrder::Newest),
            "title" | "name" => Ok(SortOrder::Title),
            "deadline" | "date" => Ok(SortOrder::Deadline),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A stored to-do item.
///
/// Tag names are not part of the row; use [`TaskWithTags`] for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        if self.is_completed {
            TaskStatus::Completed
        } else {
            TaskStatus::Active
        }
    }
}

/// Insert payload for a task. `id` is assigned by the store when `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub id: Option<TaskId>,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub category_id: Option<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            is_completed: false,
            category_id: None,
            created_at: truncate_to_millis(Utc::now()),
            deadline: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = is_completed;
        self
    }

    pub fn deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn category(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }
}

impl From<Task> for NewTask {
    fn from(task: Task) -> Self {
        Self {
            id: Some(task.id),
            title: task.title,
            description: task.description,
            is_completed: task.is_completed,
            category_id: task.category_id,
            created_at: task.created_at,
            deadline: task.deadline,
        }
    }
}

/// User-submitted task form, validated before it reaches storage.
///
/// Used by both the create and the edit flow. `tag_ids` is the desired
/// end state of the task's associations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub category_id: Option<CategoryId>,
    pub tag_ids: Vec<TagId>,
}

/// A short label; a task may carry any number of them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Many-to-many link between a task and a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskTag {
    pub task_id: TaskId,
    pub tag_id: TagId,
}

/// Optional single classification of a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// `#RRGGBB` display color.
    pub color: String,
}

/// Read-time join of a task with the names of its tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskWithTags {
    #[serde(flatten)]
    pub task: Task,
    pub tags: Vec<String>,
}

/// A task removed by the user, kept so the delete can be reverted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedTask {
    pub task: Task,
    pub tag_ids: Vec<TagId>,
}

/// Partition counts of the task table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub active: u64,
    pub completed: u64,
}

impl TaskStats {
    pub fn total(&self) -> u64 {
        self.active + self.completed
    }
}

/// Drop sub-millisecond precision; stored times are unix milliseconds.
pub fn truncate_to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}

/// Tags offered on the task form, created on first use.
pub const DEFAULT_TAGS: [&str; 8] = [
    "Work",
    "Home",
    "Urgent",
    "Important",
    "Learning",
    "Health",
    "Shopping",
    "Social",
];

/// Display name used when a tag reference no longer resolves.
pub const MISSING_TAG_NAME: &str = "no name";
