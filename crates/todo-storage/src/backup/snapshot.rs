//! Binary snapshots of the database file.
//!
//! A snapshot is a byte copy named `<database_name>_<yyyy-MM-dd_HH-mm-ss>.db`.
//! Restore replaces the live file with the newest snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use super::{newest_first, BackupError, BackupResult};
use crate::db::Database;

pub const SNAPSHOT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
pub const SNAPSHOT_EXTENSION: &str = ".db";

pub fn snapshot_file_name(database_name: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}{}",
        database_name,
        at.format(SNAPSHOT_TIME_FORMAT),
        SNAPSHOT_EXTENSION
    )
}

/// Copy the live database file into `dir`.
///
/// A second snapshot within the same second replaces the first.
pub fn backup_database(db: &Database, dir: &Path, database_name: &str) -> BackupResult<PathBuf> {
    ensure_live_file(db)?;
    std::fs::create_dir_all(dir)?;

    let dest = dir.join(snapshot_file_name(database_name, Local::now()));
    let bytes = db.copy_file_to(&dest)?;
    info!(path = %dest.display(), bytes, "Database snapshot written");
    Ok(dest)
}

/// Newest snapshot of `database_name` in `dir`.
pub fn latest_snapshot(dir: &Path, database_name: &str) -> BackupResult<PathBuf> {
    let prefix = format!("{}_", database_name);
    newest_first(dir, |name| {
        name.starts_with(&prefix) && name.ends_with(SNAPSHOT_EXTENSION)
    })?
    .into_iter()
    .next()
    .ok_or_else(|| BackupError::NoBackups(dir.to_path_buf()))
}

/// Replace the live database with the newest snapshot. Returns the snapshot used.
pub fn restore_latest(db: &Database, dir: &Path, database_name: &str) -> BackupResult<PathBuf> {
    ensure_live_file(db)?;
    let source = latest_snapshot(dir, database_name)?;
    let bytes = db.replace_file_from(&source)?;
    info!(path = %source.display(), bytes, "Database restored from snapshot");
    Ok(source)
}

fn ensure_live_file(db: &Database) -> BackupResult<()> {
    match db.path() {
        Some(path) if path.is_file() => Ok(()),
        _ => Err(BackupError::DatabaseMissing),
    }
}
