//! Todo storage crate - SQLite persistence, live queries, backups.
//!
//! Provides a WAL-mode SQLite database with migrations, entity stores for
//! tasks/tags/categories/task_tags, a live query hub that pushes fresh
//! results after every relevant write, the repository façade used by the
//! application, and JSON/snapshot backups.

pub mod backup;
pub mod db;
pub mod live;
pub mod migrations;
pub mod queries;
pub mod repository;
pub mod store;

pub use backup::{BackupDocument, BackupError, BackupResult, BackupService};
pub use db::{Database, Table};
pub use live::LiveQuery;
pub use queries::TaskQuery;
pub use repository::{ChangeListener, TaskRepository};
pub use store::{CategoryStore, TagStore, TaskStore, TaskTagStore};
