//! Deadline reminders.
//!
//! Periodically looks for active tasks whose deadline falls within the
//! look-ahead window and reports each one once per run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};

use todo_core::config::ReminderConfig;
use todo_core::error::TodoError;
use todo_core::types::{Task, TaskId};
use todo_storage::TaskRepository;

/// Background loop that surfaces upcoming deadlines.
pub struct ReminderScheduler {
    repo: Arc<TaskRepository>,
    lookahead: Duration,
    interval: std::time::Duration,
    reminded: Mutex<HashSet<TaskId>>,
    shutdown: Arc<Notify>,
}

impl ReminderScheduler {
    pub fn new(repo: Arc<TaskRepository>, config: &ReminderConfig) -> Self {
        Self {
            repo,
            lookahead: Duration::minutes(i64::from(config.lookahead_minutes)),
            interval: std::time::Duration::from_secs(config.check_interval_secs.max(1)),
            reminded: Mutex::new(HashSet::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Active tasks due within the window that have not been reported yet.
    pub async fn due_now(&self, now: DateTime<Utc>) -> Result<Vec<Task>, TodoError> {
        let upcoming = self.repo.upcoming_deadlines(now, self.lookahead).await?;
        let mut reminded = self
            .reminded
            .lock()
            .map_err(|e| TodoError::Storage(format!("Reminder state poisoned: {}", e)))?;
        Ok(upcoming
            .into_iter()
            .filter(|task| reminded.insert(task.id))
            .collect())
    }

    /// Check now and then every interval, handing each due task to `notify`.
    ///
    /// Returns on shutdown signal.
    pub async fn run<F>(&self, notify: F)
    where
        F: Fn(&Task),
    {
        loop {
            match self.due_now(Utc::now()).await {
                Ok(tasks) => {
                    debug!(count = tasks.len(), "Reminder check");
                    for task in &tasks {
                        notify(task);
                    }
                }
                Err(e) => warn!(error = %e, "Reminder check failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Signal the loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// One-line reminder text, e.g. `Reminder: Pay rent (due in 25 min)`.
pub fn format_reminder(task: &Task, now: DateTime<Utc>) -> String {
    match task.deadline {
        Some(deadline) if deadline > now => {
            let minutes = (deadline - now).num_minutes();
            format!("Reminder: {} (due in {} min)", task.title, minutes)
        }
        _ => format!("Reminder: {} (due now)", task.title),
    }
}
