//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and foreign keys on initialization. Every write
//! names the tables it touches; the matching live queries are re-run
//! before the write returns.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use todo_core::error::TodoError;

use crate::live::{LiveQueries, LiveQuery};
use crate::migrations;

/// Tables a write can touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Tasks,
    Tags,
    TaskTags,
    Categories,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::Tasks, Table::Tags, Table::TaskTags, Table::Categories];

    fn index(self) -> usize {
        match self {
            Table::Tasks => 0,
            Table::Tags => 1,
            Table::TaskTags => 2,
            Table::Categories => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Table::Tasks => "tasks",
            Table::Tags => "tags",
            Table::TaskTags => "task_tags",
            Table::Categories => "categories",
        }
    }
}

/// Thread-safe SQLite database wrapper.
///
/// Construct one per process and share it as `Arc<Database>`.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    versions: [AtomicU64; 4],
    live: LiveQueries,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, foreign keys, and runs
    /// all pending migrations.
    pub fn new(path: &Path) -> Result<Self, TodoError> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = open_connection(path)?;
        info!("Database opened at {}", path.display());

        Ok(Self::from_connection(conn, Some(path.to_path_buf())))
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, TodoError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TodoError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| TodoError::Storage(format!("Failed to set pragmas: {}", e)))?;
        migrations::run_migrations(&conn)?;

        Ok(Self::from_connection(conn, None))
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(conn),
            path,
            versions: Default::default(),
            live: LiveQueries::default(),
        }
    }

    /// Backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of committed writes that touched `table`.
    pub fn version(&self, table: Table) -> u64 {
        self.versions[table.index()].load(Ordering::Acquire)
    }

    /// Number of live queries still held by a subscriber.
    pub fn live_query_count(&self) -> usize {
        self.live.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TodoError> {
        self.conn
            .lock()
            .map_err(|e| TodoError::Storage(format!("Database lock poisoned: {}", e)))
    }

    /// Execute a read-only closure with the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TodoError>
    where
        F: FnOnce(&Connection) -> Result<T, TodoError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a mutating closure, then refresh every live query that
    /// depends on one of `tables`.
    ///
    /// The refresh happens under the same lock, so subscribers observe the
    /// post-write state before this call returns and never an intermediate
    /// one. Nothing is published when the closure fails.
    pub fn write<F, T>(&self, tables: &[Table], f: F) -> Result<T, TodoError>
    where
        F: FnOnce(&Connection) -> Result<T, TodoError>,
    {
        let conn = self.lock()?;
        let result = f(&conn)?;
        self.publish(&conn, tables);
        Ok(result)
    }

    fn publish(&self, conn: &Connection, tables: &[Table]) {
        for table in tables {
            self.versions[table.index()].fetch_add(1, Ordering::AcqRel);
        }
        let refreshed = self.live.publish(conn, tables);
        debug!(
            tables = ?tables.iter().map(|t| t.name()).collect::<Vec<_>>(),
            refreshed,
            "Write committed"
        );
    }

    /// Register a live query over `tables`.
    ///
    /// `query` runs once now for the initial snapshot and again after every
    /// write touching one of `tables`.
    pub fn watch<T, F>(&self, tables: &[Table], query: F) -> Result<LiveQuery<T>, TodoError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection) -> Result<Vec<T>, TodoError> + Send + 'static,
    {
        let conn = self.lock()?;
        self.live.register(&conn, tables, Box::new(query))
    }

    /// Copy the backing file byte-for-byte to `dest`.
    ///
    /// Writers are blocked for the duration of the copy. Returns the number
    /// of bytes copied.
    pub fn copy_file_to(&self, dest: &Path) -> Result<u64, TodoError> {
        let path = self.existing_path()?;
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| TodoError::Storage(format!("Checkpoint failed: {}", e)))?;
        let bytes = std::fs::copy(&path, dest)?;
        info!(src = %path.display(), dest = %dest.display(), bytes, "Database file copied");
        Ok(bytes)
    }

    /// Replace the backing file with the contents of `source` and reopen.
    ///
    /// The source is copied next to the live file and checked before the
    /// live connection is released. The live file is moved aside rather than
    /// overwritten and is moved back if the restored file cannot be opened.
    /// All live queries are refreshed against whichever data is in place.
    pub fn replace_file_from(&self, source: &Path) -> Result<u64, TodoError> {
        let path = self.existing_path()?;
        let staging = sidecar(&path, "-restore");
        let retired = sidecar(&path, "-old");

        let mut conn = self.lock()?;
        remove_database(&staging);
        let bytes = std::fs::copy(source, &staging)?;
        if let Err(e) = verify_database_file(&staging) {
            warn!(src = %source.display(), error = %e, "Rejected restore source");
            remove_database(&staging);
            return Err(e);
        }

        let placeholder = Connection::open_in_memory()
            .map_err(|e| TodoError::Storage(format!("Failed to open placeholder: {}", e)))?;
        let old = std::mem::replace(&mut *conn, placeholder);
        if let Err((old, e)) = old.close() {
            *conn = old;
            remove_database(&staging);
            return Err(TodoError::Storage(format!(
                "Failed to close database before restore: {}",
                e
            )));
        }

        remove_database(&retired);
        match swap_in(&path, &staging, &retired) {
            Ok(restored) => {
                *conn = restored;
                remove_database(&retired);
            }
            Err(e) => {
                warn!(error = %e, "Restore failed, reopening previous database");
                remove_database(&staging);
                *conn = open_connection(&path)?;
                self.publish(&conn, &Table::ALL);
                return Err(e);
            }
        }

        info!(src = %source.display(), dest = %path.display(), bytes, "Database file replaced");
        self.publish(&conn, &Table::ALL);
        Ok(bytes)
    }

    fn existing_path(&self) -> Result<PathBuf, TodoError> {
        match &self.path {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(TodoError::NotFound(format!(
                "database file {}",
                path.display()
            ))),
            None => Err(TodoError::NotFound(
                "in-memory database has no backing file".to_string(),
            )),
        }
    }
}

/// Open a file connection with the standard pragmas and run migrations.
fn open_connection(path: &Path) -> Result<Connection, TodoError> {
    let conn = Connection::open(path)
        .map_err(|e| TodoError::Storage(format!("Failed to open database: {}", e)))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )
    .map_err(|e| TodoError::Storage(format!("Failed to set pragmas: {}", e)))?;

    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Check that `path` is an intact task database this build can migrate.
fn verify_database_file(path: &Path) -> Result<(), TodoError> {
    let unusable = |e: rusqlite::Error| {
        TodoError::Storage(format!("Not a usable database file {}: {}", path.display(), e))
    };

    let conn = Connection::open(path).map_err(unusable)?;
    let status: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(unusable)?;
    if status != "ok" {
        return Err(TodoError::Storage(format!(
            "Integrity check failed for {}: {}",
            path.display(),
            status
        )));
    }

    let has_tasks: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tasks')",
            [],
            |row| row.get(0),
        )
        .map_err(unusable)?;
    if !has_tasks {
        return Err(TodoError::Storage(format!(
            "{} holds no task table",
            path.display()
        )));
    }

    migrations::run_migrations(&conn)?;
    conn.close().map_err(|(_, e)| unusable(e))
}

/// Move the live file to `retired`, put `staging` in its place and open it.
///
/// On failure the live file is moved back before returning.
fn swap_in(path: &Path, staging: &Path, retired: &Path) -> Result<Connection, TodoError> {
    move_database(path, retired)?;
    let opened = std::fs::rename(staging, path)
        .map_err(TodoError::from)
        .and_then(|()| open_connection(path));
    match opened {
        Ok(conn) => Ok(conn),
        Err(e) => {
            remove_database(path);
            move_database(retired, path)?;
            Err(e)
        }
    }
}

/// Rename a database file along with its `-wal` and `-shm` files.
fn move_database(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::rename(from, to)?;
    for suffix in ["-wal", "-shm"] {
        let side = sidecar(from, suffix);
        if side.exists() {
            std::fs::rename(&side, sidecar(to, suffix))?;
        }
    }
    Ok(())
}

/// Remove a database file and its side files, ignoring missing ones.
fn remove_database(path: &Path) {
    for target in [
        path.to_path_buf(),
        sidecar(path, "-wal"),
        sidecar(path, "-shm"),
    ] {
        if let Err(e) = std::fs::remove_file(&target) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, path = %target.display(), "Failed to remove database file");
            }
        }
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish()
    }
}
