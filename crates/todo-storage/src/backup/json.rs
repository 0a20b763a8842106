//! Logical JSON export and import.
//!
//! An export is a pretty-printed `BackupDocument` written to
//! `tasks_backup_<unix-millis>.json`. Import parses a document back; the
//! caller inserts its tasks under fresh ids, so importing twice duplicates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use todo_core::types::{truncate_to_millis, Category, NewTask, Task};

use super::{newest_first, BackupError, BackupResult};
use crate::queries::from_millis;

pub const EXPORT_PREFIX: &str = "tasks_backup_";
pub const EXPORT_EXTENSION: &str = ".json";
pub const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The export/import unit. Tag links are not part of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub tasks: Vec<TaskSnapshot>,
    #[serde(default)]
    pub categories: Vec<CategorySnapshot>,
    #[serde(default)]
    pub export_date: String,
}

/// A task as written to an export. Times are unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub deadline: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySnapshot {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub color: String,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.0,
            title: task.title.clone(),
            description: task.description.clone(),
            is_completed: task.is_completed,
            category_id: task.category_id.map(|id| id.0),
            timestamp: Some(task.created_at.timestamp_millis()),
            deadline: task.deadline.map(|d| d.timestamp_millis()),
        }
    }
}

impl From<&Category> for CategorySnapshot {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.0,
            name: category.name.clone(),
            color: category.color.clone(),
        }
    }
}

impl TaskSnapshot {
    /// Insert payload for this snapshot.
    ///
    /// The store assigns a fresh id and the category reference is dropped;
    /// a missing creation time becomes `now`.
    pub fn to_new_task(&self, now: DateTime<Utc>) -> NewTask {
        let mut task = NewTask::new(self.title.clone())
            .description(self.description.clone())
            .completed(self.is_completed)
            .deadline(self.deadline.map(from_millis));
        task.created_at = self
            .timestamp
            .map(from_millis)
            .unwrap_or_else(|| truncate_to_millis(now));
        task
    }
}

impl BackupDocument {
    pub fn new(tasks: &[Task], categories: &[Category], exported_at: DateTime<Local>) -> Self {
        Self {
            tasks: tasks.iter().map(TaskSnapshot::from).collect(),
            categories: categories.iter().map(CategorySnapshot::from).collect(),
            export_date: exported_at.format(EXPORT_DATE_FORMAT).to_string(),
        }
    }
}

/// Write `tasks` and `categories` to a new export file in `dir`.
///
/// Creates `dir` when absent. Never overwrites an earlier export.
pub fn export_to_json(
    dir: &Path,
    tasks: &[Task],
    categories: &[Category],
) -> BackupResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let document = BackupDocument::new(tasks, categories, Local::now());
    let content = serde_json::to_string_pretty(&document)?;

    let mut millis = Utc::now().timestamp_millis();
    let path = loop {
        let candidate = dir.join(export_file_name(millis));
        if !candidate.exists() {
            break candidate;
        }
        millis += 1;
    };

    std::fs::write(&path, content)?;
    info!(
        path = %path.display(),
        tasks = document.tasks.len(),
        categories = document.categories.len(),
        "JSON export written"
    );
    Ok(path)
}

/// Parse an export file.
pub fn read_backup(path: &Path) -> BackupResult<BackupDocument> {
    if !path.is_file() {
        return Err(BackupError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let document: BackupDocument = serde_json::from_str(&content)?;
    Ok(document)
}

/// Newest export file in `dir`.
pub fn latest_export(dir: &Path) -> BackupResult<PathBuf> {
    newest_first(dir, |name| {
        name.starts_with(EXPORT_PREFIX) && name.ends_with(EXPORT_EXTENSION)
    })?
    .into_iter()
    .next()
    .ok_or_else(|| BackupError::NoBackups(dir.to_path_buf()))
}

pub fn export_file_name(millis: i64) -> String {
    format!("{}{}{}", EXPORT_PREFIX, millis, EXPORT_EXTENSION)
}
