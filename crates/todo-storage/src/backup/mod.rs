//! Backups of the task store.
//!
//! Two independent formats share one directory:
//! - `json`: logical export of tasks and categories, insert-only import.
//! - `snapshot`: byte-for-byte copy of the database file, whole-file restore.

pub mod json;
pub mod service;
pub mod snapshot;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

use todo_core::error::TodoError;

pub use json::{BackupDocument, CategorySnapshot, TaskSnapshot};
pub use service::BackupService;

/// Failure of a backup operation. `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Database file not found")]
    DatabaseMissing,

    #[error("No backups found in {}", .0.display())]
    NoBackups(PathBuf),

    #[error("Backup I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid backup file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Database(#[from] TodoError),
}

pub type BackupResult<T> = Result<T, BackupError>;

impl From<BackupError> for TodoError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::Database(inner) => inner,
            other => TodoError::Backup(other.to_string()),
        }
    }
}

/// Every file in `dir`, newest modification first.
///
/// A missing directory lists as empty.
pub fn list_backups(dir: &Path) -> BackupResult<Vec<PathBuf>> {
    newest_first(dir, |_| true)
}

/// Files in `dir` accepted by `keep`, newest modification first.
///
/// Ties on modification time fall back to the file name, descending.
pub(crate) fn newest_first<F>(dir: &Path, keep: F) -> BackupResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(&keep)
            .unwrap_or(false);
        if matches {
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }
    }

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
