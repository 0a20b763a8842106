//! Async front end for JSON exports and database snapshots.
//!
//! File work runs on tokio's blocking pool; each operation resolves once
//! the copy or parse has finished or failed. Nothing is cancelled midway.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use todo_core::error::TodoError;
use todo_core::events::ChangeEvent;
use todo_core::types::{NewTask, SortOrder};

use super::{json, snapshot, BackupError, BackupResult};
use crate::queries::TaskQuery;
use crate::repository::TaskRepository;

pub struct BackupService {
    repo: Arc<TaskRepository>,
    dir: PathBuf,
    database_name: String,
}

impl BackupService {
    pub fn new(repo: Arc<TaskRepository>, dir: PathBuf, database_name: impl Into<String>) -> Self {
        Self {
            repo,
            dir,
            database_name: database_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export the active tasks, newest first.
    ///
    /// The category list is written empty; categories are not imported back.
    pub async fn export_active_tasks(&self) -> BackupResult<PathBuf> {
        let tasks = self
            .repo
            .query_tasks(TaskQuery::active(SortOrder::Newest))
            .await?;
        let dir = self.dir.clone();
        blocking(move || json::export_to_json(&dir, &tasks, &[])).await
    }

    /// Insert every task of an export file under fresh ids.
    ///
    /// Returns the number of tasks inserted.
    pub async fn import_file(&self, path: PathBuf) -> BackupResult<usize> {
        let source = path.clone();
        let document = blocking(move || json::read_backup(&source)).await?;

        let now = Utc::now();
        let batch: Vec<NewTask> = document
            .tasks
            .iter()
            .map(|snapshot| snapshot.to_new_task(now))
            .collect();
        let inserted = self.repo.insert_tasks(batch).await?.len();
        info!(path = %path.display(), inserted, "JSON export imported");
        Ok(inserted)
    }

    /// Import the newest export in the backup directory.
    pub async fn import_latest(&self) -> BackupResult<(PathBuf, usize)> {
        let dir = self.dir.clone();
        let path = blocking(move || json::latest_export(&dir)).await?;
        let inserted = self.import_file(path.clone()).await?;
        Ok((path, inserted))
    }

    /// Snapshot the database file.
    pub async fn backup_database(&self) -> BackupResult<PathBuf> {
        let db = Arc::clone(self.repo.database());
        let dir = self.dir.clone();
        let name = self.database_name.clone();
        blocking(move || snapshot::backup_database(&db, &dir, &name)).await
    }

    /// Replace the database with the newest snapshot.
    ///
    /// Live queries are refreshed and listeners notified before this returns.
    pub async fn restore_database(&self) -> BackupResult<PathBuf> {
        let db = Arc::clone(self.repo.database());
        let dir = self.dir.clone();
        let name = self.database_name.clone();
        let source = blocking(move || snapshot::restore_latest(&db, &dir, &name)).await?;

        self.repo.notify(ChangeEvent::DatabaseRestored {
            source: source.display().to_string(),
            timestamp: Utc::now(),
        });
        Ok(source)
    }

    /// Every file in the backup directory, newest first.
    pub async fn list_backups(&self) -> BackupResult<Vec<PathBuf>> {
        let dir = self.dir.clone();
        blocking(move || super::list_backups(&dir)).await
    }
}

async fn blocking<T, F>(f: F) -> BackupResult<T>
where
    F: FnOnce() -> BackupResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackupError::Database(TodoError::Storage(format!("Backup task failed: {}", e))))?
}
