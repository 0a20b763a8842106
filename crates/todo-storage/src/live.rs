//! Live query hub.
//!
//! A live query is a read registered against a set of tables. The
//! database re-runs it after every committed write to one of those tables
//! and pushes the result into a `tokio::sync::watch` channel. A slow
//! subscriber only ever sees the latest result.

use std::sync::Mutex;

use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, warn};

use todo_core::error::TodoError;

use crate::db::Table;

pub(crate) type QueryFn<T> = Box<dyn Fn(&Connection) -> Result<Vec<T>, TodoError> + Send>;

/// Type-erased live query, refreshed by the database after writes.
trait Registration: Send {
    fn depends_on(&self, changed: &[Table]) -> bool;

    fn refresh(&self, conn: &Connection);

    /// The subscriber side is gone.
    fn is_closed(&self) -> bool;
}

struct QueryRegistration<T> {
    tables: Vec<Table>,
    query: QueryFn<T>,
    tx: watch::Sender<Vec<T>>,
}

impl<T: Send + Sync + 'static> Registration for QueryRegistration<T> {
    fn depends_on(&self, changed: &[Table]) -> bool {
        changed.iter().any(|table| self.tables.contains(table))
    }

    fn refresh(&self, conn: &Connection) {
        match (self.query)(conn) {
            Ok(rows) => {
                self.tx.send_replace(rows);
            }
            Err(e) => {
                // The subscriber keeps the previous snapshot.
                warn!(error = %e, "Live query refresh failed");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Registry of live queries owned by a `Database`.
#[derive(Default)]
pub(crate) struct LiveQueries {
    registrations: Mutex<Vec<Box<dyn Registration>>>,
}

impl LiveQueries {
    /// Run `query` for the initial snapshot and keep it for later refreshes.
    ///
    /// The caller holds the connection lock, so no write can land between
    /// the initial snapshot and the registration.
    pub(crate) fn register<T>(
        &self,
        conn: &Connection,
        tables: &[Table],
        query: QueryFn<T>,
    ) -> Result<LiveQuery<T>, TodoError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let initial = query(conn)?;
        let (tx, rx) = watch::channel(initial);

        let mut registrations = self
            .registrations
            .lock()
            .map_err(|e| TodoError::Storage(format!("Live query registry poisoned: {}", e)))?;
        registrations.retain(|r| !r.is_closed());
        registrations.push(Box::new(QueryRegistration {
            tables: tables.to_vec(),
            query,
            tx,
        }));
        debug!(active = registrations.len(), "Live query registered");

        Ok(LiveQuery::new(rx))
    }

    /// Refresh every live query depending on one of `changed`.
    ///
    /// Returns how many were refreshed.
    pub(crate) fn publish(&self, conn: &Connection, changed: &[Table]) -> usize {
        let mut registrations = match self.registrations.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registrations.retain(|r| !r.is_closed());

        let mut refreshed = 0;
        for registration in registrations.iter().filter(|r| r.depends_on(changed)) {
            registration.refresh(conn);
            refreshed += 1;
        }
        refreshed
    }

    pub(crate) fn len(&self) -> usize {
        match self.registrations.lock() {
            Ok(registrations) => registrations.iter().filter(|r| !r.is_closed()).count(),
            Err(_) => 0,
        }
    }
}

/// Subscriber handle of a live query.
///
/// Dropping it unregisters the query at the next write.
pub struct LiveQuery<T> {
    rx: watch::Receiver<Vec<T>>,
    initial_delivered: bool,
}

impl<T: Clone> LiveQuery<T> {
    fn new(rx: watch::Receiver<Vec<T>>) -> Self {
        Self {
            rx,
            initial_delivered: false,
        }
    }

    /// Latest result, without waiting.
    pub fn snapshot(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next result.
    ///
    /// The first call returns the snapshot taken at registration. Later calls
    /// resolve after the next refresh; results published while nobody was
    /// waiting collapse into the latest one. Returns `None` once the
    /// database is gone.
    pub async fn next(&mut self) -> Option<Vec<T>> {
        if !self.initial_delivered {
            self.initial_delivered = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Non-blocking variant of [`LiveQuery::next`].
    pub fn try_next(&mut self) -> Option<Vec<T>> {
        let pending = !self.initial_delivered || self.rx.has_changed().unwrap_or(false);
        if !pending {
            return None;
        }
        self.initial_delivered = true;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl<T> std::fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("initial_delivered", &self.initial_delivered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn titles(conn: &Connection) -> Result<Vec<String>, TodoError> {
        let mut stmt = conn
            .prepare("SELECT title FROM tasks ORDER BY id")
            .map_err(|e| TodoError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| TodoError::Storage(e.to_string()))?;
        rows.collect::<Result<Vec<String>, _>>()
            .map_err(|e| TodoError::Storage(e.to_string()))
    }

    fn insert(db: &Database, title: &str) {
        db.write(&[Table::Tasks], |conn| {
            conn.execute(
                "INSERT INTO tasks (title, created_at) VALUES (?1, 0)",
                rusqlite::params![title],
            )
            .map_err(|e| TodoError::Storage(e.to_string()))
        })
        .unwrap();
    }

    #[test]
    fn test_initial_snapshot() {
        let db = Database::in_memory().unwrap();
        insert(&db, "first");

        let mut live = db.watch(&[Table::Tasks], titles).unwrap();
        assert_eq!(live.snapshot(), vec!["first".to_string()]);
        assert_eq!(live.try_next(), Some(vec!["first".to_string()]));
        assert_eq!(live.try_next(), None);
    }

    #[test]
    fn test_refreshed_before_write_returns() {
        let db = Database::in_memory().unwrap();
        let mut live = db.watch(&[Table::Tasks], titles).unwrap();
        live.try_next();

        insert(&db, "a");
        assert_eq!(live.try_next(), Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_unrelated_table_does_not_refresh() {
        let db = Database::in_memory().unwrap();
        let mut live = db.watch(&[Table::Tasks], titles).unwrap();
        live.try_next();

        db.write(&[Table::Tags], |conn| {
            conn.execute("INSERT INTO tags (name) VALUES ('Work')", [])
                .map_err(|e| TodoError::Storage(e.to_string()))
        })
        .unwrap();
        assert_eq!(live.try_next(), None);
    }

    #[test]
    fn test_slow_subscriber_sees_latest() {
        let db = Database::in_memory().unwrap();
        let mut live = db.watch(&[Table::Tasks], titles).unwrap();
        live.try_next();

        insert(&db, "a");
        insert(&db, "b");
        insert(&db, "c");
        assert_eq!(live.try_next().unwrap().len(), 3);
        assert_eq!(live.try_next(), None);
    }

    #[test]
    fn test_dropped_subscriber_is_unregistered() {
        let db = Database::in_memory().unwrap();
        let live = db.watch(&[Table::Tasks], titles).unwrap();
        assert_eq!(db.live_query_count(), 1);

        drop(live);
        insert(&db, "a");
        assert_eq!(db.live_query_count(), 0);
    }

    #[tokio::test]
    async fn test_next_awaits_refresh() {
        let db = std::sync::Arc::new(Database::in_memory().unwrap());
        let mut live = db.watch(&[Table::Tasks], titles).unwrap();
        assert_eq!(live.next().await, Some(vec![]));

        let writer = std::sync::Arc::clone(&db);
        tokio::task::spawn_blocking(move || insert(&writer, "late"))
            .await
            .unwrap();
        assert_eq!(live.next().await, Some(vec!["late".to_string()]));
    }
}
