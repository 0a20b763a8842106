//! Home-screen widget feed.
//!
//! A dedicated OS thread owns the widget file. Each refresh signal makes it
//! read the active tasks with a blocking query and rewrite the file; a
//! burst of signals collapses into one rewrite. The async runtime never
//! waits on it.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use todo_core::error::TodoError;
use todo_core::events::ChangeEvent;
use todo_core::types::{Task, TaskId};
use todo_storage::{ChangeListener, TaskRepository};

enum Signal {
    Refresh,
    Shutdown,
}

/// Content of the widget file.
#[derive(Debug, Serialize)]
pub struct WidgetSnapshot {
    pub updated_at: DateTime<Utc>,
    pub active_count: usize,
    pub tasks: Vec<WidgetItem>,
}

#[derive(Debug, Serialize)]
pub struct WidgetItem {
    pub id: TaskId,
    pub title: String,
    pub deadline: Option<DateTime<Utc>>,
}

impl WidgetSnapshot {
    pub fn new(tasks: &[Task], max_items: usize) -> Self {
        Self {
            updated_at: Utc::now(),
            active_count: tasks.len(),
            tasks: tasks
                .iter()
                .take(max_items)
                .map(|task| WidgetItem {
                    id: task.id,
                    title: task.title.clone(),
                    deadline: task.deadline,
                })
                .collect(),
        }
    }
}

/// Background writer of the widget file.
pub struct WidgetFeed {
    tx: mpsc::Sender<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl WidgetFeed {
    /// Start the feed thread. Nothing is written until the first refresh.
    pub fn spawn(
        repo: Arc<TaskRepository>,
        path: PathBuf,
        max_items: usize,
    ) -> Result<Self, TodoError> {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("widget-feed".to_string())
            .spawn(move || feed_loop(&repo, &path, max_items, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn refresh(&self) {
        let _ = self.tx.send(Signal::Refresh);
    }

    /// Listener that requests a refresh whenever task data changes.
    pub fn listener(&self) -> Arc<dyn ChangeListener> {
        Arc::new(WidgetRefresher {
            tx: self.tx.clone(),
        })
    }

    /// Finish pending refreshes and stop the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(Signal::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Widget feed thread panicked");
            }
        }
    }
}

impl Drop for WidgetFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WidgetRefresher {
    tx: mpsc::Sender<Signal>,
}

impl ChangeListener for WidgetRefresher {
    fn on_change(&self, event: &ChangeEvent) {
        if event.affects_tasks() {
            let _ = self.tx.send(Signal::Refresh);
        }
    }
}

fn feed_loop(repo: &TaskRepository, path: &Path, max_items: usize, rx: mpsc::Receiver<Signal>) {
    debug!(path = %path.display(), "Widget feed started");
    while let Ok(signal) = rx.recv() {
        let mut stop = matches!(signal, Signal::Shutdown);
        let mut pending = !stop;

        // Collapse queued signals into one rewrite.
        while let Ok(next) = rx.try_recv() {
            match next {
                Signal::Refresh => pending = true,
                Signal::Shutdown => stop = true,
            }
        }

        if pending {
            match write_snapshot(repo, path, max_items) {
                Ok(count) => debug!(count, "Widget refreshed"),
                Err(e) => warn!(error = %e, "Widget refresh failed"),
            }
        }
        if stop {
            break;
        }
    }
    info!("Widget feed stopped");
}

/// Fetch active tasks and replace the widget file. Returns the number written.
pub fn write_snapshot(
    repo: &TaskRepository,
    path: &Path,
    max_items: usize,
) -> Result<usize, TodoError> {
    let tasks = repo.active_tasks_blocking()?;
    let snapshot = WidgetSnapshot::new(&tasks, max_items);
    let content = serde_json::to_string_pretty(&snapshot)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(snapshot.tasks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_core::types::TaskDraft;
    use todo_storage::Database;

    fn make_repo() -> Arc<TaskRepository> {
        Arc::new(TaskRepository::new(Arc::new(Database::in_memory().unwrap())))
    }

    fn read(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_write_snapshot_caps_items() {
        let repo = make_repo();
        repo.seed_tasks(10).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.json");

        let written = write_snapshot(&repo, &path, 3).unwrap();
        assert_eq!(written, 3);
        let value = read(&path);
        assert_eq!(value["active_count"], 5);
        assert_eq!(value["tasks"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_feed_follows_repository_changes() {
        let repo = make_repo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.json");

        let feed = WidgetFeed::spawn(Arc::clone(&repo), path.clone(), 20).unwrap();
        repo.add_listener(feed.listener());

        repo.create_task(TaskDraft {
            title: "Shown on widget".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        feed.shutdown();

        let value = read(&path);
        assert_eq!(value["tasks"][0]["title"], "Shown on widget");
    }

    #[test]
    fn test_shutdown_without_refresh_writes_nothing() {
        let repo = make_repo();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.json");

        let feed = WidgetFeed::spawn(repo, path.clone(), 20).unwrap();
        feed.shutdown();
        assert!(!path.exists());
    }
}
