//! Application-facing task repository.
//!
//! Composes the entity stores behind one handle. Async methods move the
//! blocking SQLite work onto tokio's blocking pool. Every task mutation
//! ends with a change notification to registered listeners and to the
//! broadcast channel.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use todo_core::error::TodoError;
use todo_core::events::ChangeEvent;
use todo_core::types::{
    Category, CategoryId, DeletedTask, NewTask, SortOrder, Tag, TagId, Task, TaskDraft, TaskId,
    TaskStats, TaskStatus, TaskTag, TaskWithTags, DEFAULT_TAGS, MISSING_TAG_NAME,
};
use todo_core::validation::{validate_color, validate_draft, validate_name};

use crate::db::{Database, Table};
use crate::live::LiveQuery;
use crate::queries::{self, TaskQuery};
use crate::store::{CategoryStore, TagStore, TaskStore, TaskTagStore};

/// Capacity of the change event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Hook invoked after every change to stored data.
///
/// Runs on the caller's thread right after the write; implementations
/// should hand heavy work off elsewhere.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Single entry point for task, tag, and category data.
pub struct TaskRepository {
    db: Arc<Database>,
    tasks: TaskStore,
    tags: TagStore,
    categories: CategoryStore,
    task_tags: TaskTagStore,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    event_tx: broadcast::Sender<ChangeEvent>,
}

impl TaskRepository {
    pub fn new(db: Arc<Database>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tasks: TaskStore::new(Arc::clone(&db)),
            tags: TagStore::new(Arc::clone(&db)),
            categories: CategoryStore::new(Arc::clone(&db)),
            task_tags: TaskTagStore::new(Arc::clone(&db)),
            db,
            listeners: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(e) => warn!(error = %e, "Listener registry poisoned; listener dropped"),
        }
    }

    /// Receive every change event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn notify(&self, event: ChangeEvent) {
        debug!(event = event.event_name(), "Data changed");
        if let Ok(listeners) = self.listeners.read() {
            for listener in listeners.iter() {
                listener.on_change(&event);
            }
        }
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    // ========================================================================
    // Task writes
    // ========================================================================

    /// Validate a submitted form and store the task with its tags.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<TaskId, TodoError> {
        let draft = validate_draft(&draft)?;
        let new_task = NewTask::new(draft.title)
            .description(draft.description)
            .deadline(draft.deadline)
            .category(draft.category_id);

        let tasks = self.tasks.clone();
        let tag_ids = draft.tag_ids;
        let id = run_blocking(move || tasks.insert_with_tags(&new_task, &tag_ids)).await?;

        info!(task_id = %id, "Task created");
        self.notify(ChangeEvent::TaskInserted {
            task_id: id,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    /// Apply an edited form to an existing task and replace its tag set.
    ///
    /// Completion state and creation time are kept. Returns `false` when
    /// the task no longer exists.
    pub async fn edit_task(&self, id: TaskId, draft: TaskDraft) -> Result<bool, TodoError> {
        let draft = validate_draft(&draft)?;
        let tasks = self.tasks.clone();

        let updated = run_blocking(move || {
            let Some(mut task) = tasks.find_by_id(id)? else {
                return Ok(0);
            };
            task.title = draft.title;
            task.description = draft.description;
            task.deadline = draft.deadline;
            task.category_id = draft.category_id;
            tasks.update_with_tags(&task, &draft.tag_ids)
        })
        .await?;

        self.notify(ChangeEvent::TaskUpdated {
            task_id: id,
            timestamp: Utc::now(),
        });
        Ok(updated > 0)
    }

    /// Insert a task row as given. No validation.
    pub async fn insert_task(&self, task: NewTask) -> Result<TaskId, TodoError> {
        let tasks = self.tasks.clone();
        let id = run_blocking(move || tasks.insert(&task)).await?;
        self.notify(ChangeEvent::TaskInserted {
            task_id: id,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    /// Rewrite a task row. A missing id changes nothing.
    pub async fn update_task(&self, task: Task) -> Result<usize, TodoError> {
        let task_id = task.id;
        let tasks = self.tasks.clone();
        let updated = run_blocking(move || tasks.update(&task)).await?;
        self.notify(ChangeEvent::TaskUpdated {
            task_id,
            timestamp: Utc::now(),
        });
        Ok(updated)
    }

    pub async fn set_completed(&self, id: TaskId, is_completed: bool) -> Result<usize, TodoError> {
        let tasks = self.tasks.clone();
        let updated = run_blocking(move || tasks.set_completed(id, is_completed)).await?;
        self.notify(ChangeEvent::TaskCompletionChanged {
            task_id: id,
            is_completed,
            timestamp: Utc::now(),
        });
        Ok(updated)
    }

    /// Flip the completion flag. Returns the new value, `None` for a missing task.
    pub async fn toggle_completed(&self, id: TaskId) -> Result<Option<bool>, TodoError> {
        let Some(task) = self.find_task(id).await? else {
            return Ok(None);
        };
        let next = !task.is_completed;
        self.set_completed(id, next).await?;
        Ok(Some(next))
    }

    /// Delete a task. Returns what [`TaskRepository::restore_task`] needs to undo it.
    pub async fn delete_task(&self, id: TaskId) -> Result<Option<DeletedTask>, TodoError> {
        let tasks = self.tasks.clone();
        let deleted = run_blocking(move || tasks.take(id)).await?;
        self.notify(ChangeEvent::TaskDeleted {
            task_id: id,
            timestamp: Utc::now(),
        });
        Ok(deleted)
    }

    /// Undo a delete: the task comes back under its old id with its surviving tags.
    pub async fn restore_task(&self, deleted: DeletedTask) -> Result<TaskId, TodoError> {
        let tasks = self.tasks.clone();
        let id = run_blocking(move || tasks.restore(&deleted)).await?;
        self.notify(ChangeEvent::TaskInserted {
            task_id: id,
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    pub async fn delete_all_tasks(&self) -> Result<usize, TodoError> {
        let tasks = self.tasks.clone();
        let removed = run_blocking(move || tasks.delete_all()).await?;
        info!(removed, "All tasks deleted");
        self.notify(ChangeEvent::TasksCleared {
            removed,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    /// Insert `count` generated tasks; every other one starts completed.
    pub async fn seed_tasks(&self, count: usize) -> Result<Vec<TaskId>, TodoError> {
        let batch: Vec<NewTask> = (0..count)
            .map(|i| {
                NewTask::new(format!("Test task {}", i + 1))
                    .description(format!("Description of task {}", i + 1))
                    .completed(i % 2 == 0)
            })
            .collect();
        let ids = self.insert_tasks(batch).await?;
        info!(count = ids.len(), "Seeded test tasks");
        Ok(ids)
    }

    /// Insert a batch of task rows in one transaction.
    pub async fn insert_tasks(&self, batch: Vec<NewTask>) -> Result<Vec<TaskId>, TodoError> {
        let tasks = self.tasks.clone();
        let ids = run_blocking(move || tasks.insert_many(&batch)).await?;
        self.notify(ChangeEvent::TasksImported {
            count: ids.len(),
            timestamp: Utc::now(),
        });
        Ok(ids)
    }

    // ========================================================================
    // Task reads
    // ========================================================================

    pub async fn find_task(&self, id: TaskId) -> Result<Option<Task>, TodoError> {
        let tasks = self.tasks.clone();
        run_blocking(move || tasks.find_by_id(id)).await
    }

    /// Run a task query once.
    pub async fn query_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, TodoError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || db.with_conn(|conn| query.run(conn))).await
    }

    /// Attach tag names to each task for display.
    pub async fn with_tags(&self, tasks: Vec<Task>) -> Result<Vec<TaskWithTags>, TodoError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            db.with_conn(|conn| {
                tasks
                    .into_iter()
                    .map(|task| -> Result<TaskWithTags, TodoError> {
                        let tags = queries::tags_for_task(conn, task.id)?
                            .into_iter()
                            .map(|tag| tag.name)
                            .collect();
                        Ok(TaskWithTags { task, tags })
                    })
                    .collect()
            })
        })
        .await
    }

    pub async fn stats(&self) -> Result<TaskStats, TodoError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || db.with_conn(queries::task_stats)).await
    }

    /// Active tasks due within `window` from `now`, soonest first.
    pub async fn upcoming_deadlines(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<Task>, TodoError> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            db.with_conn(|conn| queries::active_tasks_due_between(conn, now, now + window))
        })
        .await
    }

    /// Active tasks, newest first, read on the calling thread.
    ///
    /// For callers outside the async runtime.
    pub fn active_tasks_blocking(&self) -> Result<Vec<Task>, TodoError> {
        self.db
            .with_conn(|conn| TaskQuery::active(SortOrder::Newest).run(conn))
    }

    // ========================================================================
    // Live task queries
    // ========================================================================

    pub fn watch(&self, query: TaskQuery) -> Result<LiveQuery<Task>, TodoError> {
        let tables = query.tables();
        self.db.watch(tables, move |conn| query.run(conn))
    }

    pub fn active_tasks(&self, order: SortOrder) -> Result<LiveQuery<Task>, TodoError> {
        self.watch(TaskQuery::active(order))
    }

    pub fn completed_tasks(&self, order: SortOrder) -> Result<LiveQuery<Task>, TodoError> {
        self.watch(TaskQuery::completed(order))
    }

    pub fn search_tasks(
        &self,
        status: TaskStatus,
        text: &str,
        order: SortOrder,
    ) -> Result<LiveQuery<Task>, TodoError> {
        self.watch(TaskQuery::search(status, text, order))
    }

    pub fn tasks_due_from(&self, from: DateTime<Utc>) -> Result<LiveQuery<Task>, TodoError> {
        self.watch(TaskQuery::due_from(from))
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn watch_tags(&self) -> Result<LiveQuery<Tag>, TodoError> {
        self.db.watch(&[Table::Tags], queries::all_tags)
    }

    pub fn watch_tags_for_task(&self, task_id: TaskId) -> Result<LiveQuery<Tag>, TodoError> {
        self.db.watch(&[Table::Tags, Table::TaskTags], move |conn| {
            queries::tags_for_task(conn, task_id)
        })
    }

    pub async fn all_tags(&self) -> Result<Vec<Tag>, TodoError> {
        let tags = self.tags.clone();
        run_blocking(move || tags.all()).await
    }

    /// Create the default tags that do not exist yet and return every tag.
    pub async fn ensure_default_tags(&self) -> Result<Vec<Tag>, TodoError> {
        let tags = self.tags.clone();
        let (created, all) = run_blocking(move || {
            let created = tags.insert_missing(&DEFAULT_TAGS)?;
            Ok((created, tags.all()?))
        })
        .await?;

        for tag_id in created {
            self.notify(ChangeEvent::TagInserted {
                tag_id,
                timestamp: Utc::now(),
            });
        }
        Ok(all)
    }

    /// Create a tag, or return the id of the tag already carrying `name`.
    pub async fn insert_tag(&self, name: &str) -> Result<TagId, TodoError> {
        let name = validate_name("tag", name)?;
        let tags = self.tags.clone();
        let (tag_id, created) = run_blocking(move || tags.find_or_insert(&name)).await?;
        if created {
            self.notify(ChangeEvent::TagInserted {
                tag_id,
                timestamp: Utc::now(),
            });
        }
        Ok(tag_id)
    }

    /// Delete a tag; every task loses it.
    pub async fn delete_tag(&self, id: TagId) -> Result<usize, TodoError> {
        let tags = self.tags.clone();
        let removed = run_blocking(move || tags.delete(id)).await?;
        self.notify(ChangeEvent::TagDeleted {
            tag_id: id,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    /// Name of a tag, or [`MISSING_TAG_NAME`] when it cannot be resolved.
    ///
    /// Never fails; lookup errors are logged.
    pub async fn tag_name(&self, id: TagId) -> String {
        let tags = self.tags.clone();
        match run_blocking(move || tags.find_by_id(id)).await {
            Ok(Some(tag)) => tag.name,
            Ok(None) => MISSING_TAG_NAME.to_string(),
            Err(e) => {
                warn!(tag_id = %id, error = %e, "Tag lookup failed");
                MISSING_TAG_NAME.to_string()
            }
        }
    }

    pub async fn tags_for_task(&self, task_id: TaskId) -> Result<Vec<Tag>, TodoError> {
        let task_tags = self.task_tags.clone();
        run_blocking(move || task_tags.tags_for_task(task_id)).await
    }

    /// Tag ids currently linked to a task, to pre-select them in the edit form.
    pub async fn task_tag_ids(&self, task_id: TaskId) -> Result<Vec<TagId>, TodoError> {
        let task_tags = self.task_tags.clone();
        run_blocking(move || task_tags.tag_ids_for_task(task_id)).await
    }

    pub async fn link_tag(&self, link: TaskTag) -> Result<(), TodoError> {
        let task_tags = self.task_tags.clone();
        run_blocking(move || task_tags.insert(link)).await?;
        self.notify(ChangeEvent::TaskTagsReplaced {
            task_id: link.task_id,
            tag_count: 1,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn unlink_tag(&self, link: TaskTag) -> Result<usize, TodoError> {
        let task_tags = self.task_tags.clone();
        let removed = run_blocking(move || task_tags.delete(link)).await?;
        self.notify(ChangeEvent::TaskTagsReplaced {
            task_id: link.task_id,
            tag_count: 0,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    /// Make `tag_ids` the complete tag set of a task.
    ///
    /// Either the whole new set is stored or the old set is kept.
    pub async fn replace_task_tags(
        &self,
        task_id: TaskId,
        tag_ids: Vec<TagId>,
    ) -> Result<usize, TodoError> {
        let task_tags = self.task_tags.clone();
        let tag_count = run_blocking(move || task_tags.replace_for_task(task_id, &tag_ids)).await?;
        self.notify(ChangeEvent::TaskTagsReplaced {
            task_id,
            tag_count,
            timestamp: Utc::now(),
        });
        Ok(tag_count)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn all_categories(&self) -> Result<Vec<Category>, TodoError> {
        let categories = self.categories.clone();
        run_blocking(move || categories.all()).await
    }

    pub async fn insert_category(&self, name: &str, color: &str) -> Result<CategoryId, TodoError> {
        let name = validate_name("category", name)?;
        let color = validate_color(color)?;
        let categories = self.categories.clone();
        let category_id = run_blocking(move || categories.insert(&name, &color)).await?;
        self.notify(ChangeEvent::CategorySaved {
            category_id,
            timestamp: Utc::now(),
        });
        Ok(category_id)
    }

    pub async fn update_category(&self, category: Category) -> Result<usize, TodoError> {
        let category = Category {
            name: validate_name("category", &category.name)?,
            color: validate_color(&category.color)?,
            ..category
        };
        let category_id = category.id;
        let categories = self.categories.clone();
        let updated = run_blocking(move || categories.update(&category)).await?;
        self.notify(ChangeEvent::CategorySaved {
            category_id,
            timestamp: Utc::now(),
        });
        Ok(updated)
    }

    /// Delete a category; its tasks stay, uncategorized.
    pub async fn delete_category(&self, id: CategoryId) -> Result<usize, TodoError> {
        let categories = self.categories.clone();
        let removed = run_blocking(move || categories.delete(id)).await?;
        self.notify(ChangeEvent::CategoryDeleted {
            category_id: id,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }
}

/// Run blocking storage work on tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, TodoError>
where
    F: FnOnce() -> Result<T, TodoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TodoError::Storage(format!("Storage task failed: {}", e)))?
}
