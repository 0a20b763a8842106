//! Entity stores for SQLite-backed persistence.
//!
//! Provides TaskStore, TagStore, CategoryStore, and TaskTagStore that
//! operate on the Database struct using raw SQL. Every write declares the
//! tables it touches so dependent live queries refresh.
//!
//! Updates and deletes return the number of affected rows; targeting a
//! missing id is a successful no-op.

use std::sync::Arc;

use rusqlite::Connection;

use todo_core::error::TodoError;
use todo_core::types::{
    Category, CategoryId, DeletedTask, NewTask, Tag, TagId, Task, TaskId, TaskTag,
};

use crate::db::{Database, Table};
use crate::queries;

// ============================================================================
// Tasks
// ============================================================================

/// Store for task rows.
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<Database>,
}

impl TaskStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a task. Uses `task.id` when given, otherwise a fresh id.
    pub fn insert(&self, task: &NewTask) -> Result<TaskId, TodoError> {
        self.db.write(&[Table::Tasks], |conn| insert_task(conn, task))
    }

    /// Insert many tasks in one transaction.
    pub fn insert_many(&self, tasks: &[NewTask]) -> Result<Vec<TaskId>, TodoError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        self.db.write(&[Table::Tasks], |conn| {
            let tx = begin(conn)?;
            let mut ids = Vec::with_capacity(tasks.len());
            for task in tasks {
                ids.push(insert_task(&tx, task)?);
            }
            commit(tx)?;
            Ok(ids)
        })
    }

    /// Insert a task and its tag links atomically.
    pub fn insert_with_tags(&self, task: &NewTask, tag_ids: &[TagId]) -> Result<TaskId, TodoError> {
        self.db.write(&[Table::Tasks, Table::TaskTags], |conn| {
            let tx = begin(conn)?;
            let id = insert_task(&tx, task)?;
            replace_task_tags(&tx, id, tag_ids)?;
            commit(tx)?;
            Ok(id)
        })
    }

    /// Rewrite every field of the row with the same id.
    pub fn update(&self, task: &Task) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tasks], |conn| update_task(conn, task))
    }

    /// Rewrite a task and replace its tag set atomically.
    ///
    /// Tags are left alone when the task does not exist.
    pub fn update_with_tags(&self, task: &Task, tag_ids: &[TagId]) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tasks, Table::TaskTags], |conn| {
            let tx = begin(conn)?;
            let updated = update_task(&tx, task)?;
            if updated > 0 {
                replace_task_tags(&tx, task.id, tag_ids)?;
            }
            commit(tx)?;
            Ok(updated)
        })
    }

    pub fn set_completed(&self, id: TaskId, is_completed: bool) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tasks], |conn| {
            conn.execute(
                "UPDATE tasks SET is_completed = ?1 WHERE id = ?2",
                rusqlite::params![is_completed, id.0],
            )
            .map_err(|e| TodoError::Storage(format!("Failed to update task {}: {}", id, e)))
        })
    }

    /// Delete a task; its tag links cascade.
    pub fn delete(&self, id: TaskId) -> Result<usize, TodoError> {
        self.db
            .write(&[Table::Tasks, Table::TaskTags], |conn| delete_task(conn, id))
    }

    /// Delete a task and return what is needed to put it back.
    pub fn take(&self, id: TaskId) -> Result<Option<DeletedTask>, TodoError> {
        self.db.write(&[Table::Tasks, Table::TaskTags], |conn| {
            let tx = begin(conn)?;
            let Some(task) = queries::find_task(&tx, id)? else {
                return Ok(None);
            };
            let tag_ids = queries::tag_ids_for_task(&tx, id)?;
            delete_task(&tx, id)?;
            commit(tx)?;
            Ok(Some(DeletedTask { task, tag_ids }))
        })
    }

    /// Re-insert a task removed by [`TaskStore::take`] under its old id.
    ///
    /// Links to tags deleted in the meantime are skipped, and a category
    /// deleted in the meantime is cleared.
    pub fn restore(&self, deleted: &DeletedTask) -> Result<TaskId, TodoError> {
        self.db.write(&[Table::Tasks, Table::TaskTags], |conn| {
            let tx = begin(conn)?;
            let mut task = NewTask::from(deleted.task.clone());
            if let Some(category_id) = task.category_id {
                if !queries::category_exists(&tx, category_id)? {
                    task.category_id = None;
                }
            }
            let id = insert_task(&tx, &task)?;

            let mut surviving = Vec::with_capacity(deleted.tag_ids.len());
            for tag_id in &deleted.tag_ids {
                if queries::find_tag(&tx, *tag_id)?.is_some() {
                    surviving.push(*tag_id);
                }
            }
            replace_task_tags(&tx, id, &surviving)?;
            commit(tx)?;
            Ok(id)
        })
    }

    /// Remove every task. Returns how many were removed.
    pub fn delete_all(&self) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tasks, Table::TaskTags], |conn| {
            conn.execute("DELETE FROM tasks", [])
                .map_err(|e| TodoError::Storage(format!("Failed to delete tasks: {}", e)))
        })
    }

    pub fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, TodoError> {
        self.db.with_conn(|conn| queries::find_task(conn, id))
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Store for tag rows.
#[derive(Clone)]
pub struct TagStore {
    db: Arc<Database>,
}

impl TagStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a tag unless one with the same name exists.
    ///
    /// Returns the tag's id either way.
    pub fn insert(&self, name: &str) -> Result<TagId, TodoError> {
        self.find_or_insert(name).map(|(id, _)| id)
    }

    /// Like [`insert`](Self::insert), also reporting whether a row was created.
    pub fn find_or_insert(&self, name: &str) -> Result<(TagId, bool), TodoError> {
        self.db.write(&[Table::Tags], |conn| {
            let tx = begin(conn)?;
            if let Some(existing) = queries::find_tag_by_name(&tx, name)? {
                return Ok((existing.id, false));
            }
            tx.execute("INSERT INTO tags (name) VALUES (?1)", rusqlite::params![name])
                .map_err(|e| TodoError::Storage(format!("Failed to insert tag: {}", e)))?;
            let id = TagId(tx.last_insert_rowid());
            commit(tx)?;
            Ok((id, true))
        })
    }

    /// Insert every name in `names` that no tag carries yet.
    ///
    /// Returns the ids of the created tags.
    pub fn insert_missing(&self, names: &[&str]) -> Result<Vec<TagId>, TodoError> {
        self.db.write(&[Table::Tags], |conn| {
            let tx = begin(conn)?;
            let mut created = Vec::new();
            for name in names {
                if queries::find_tag_by_name(&tx, name)?.is_none() {
                    tx.execute("INSERT INTO tags (name) VALUES (?1)", rusqlite::params![name])
                        .map_err(|e| TodoError::Storage(format!("Failed to insert tag: {}", e)))?;
                    created.push(TagId(tx.last_insert_rowid()));
                }
            }
            commit(tx)?;
            Ok(created)
        })
    }

    pub fn update(&self, tag: &Tag) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tags], |conn| {
            conn.execute(
                "UPDATE tags SET name = ?1 WHERE id = ?2",
                rusqlite::params![tag.name, tag.id.0],
            )
            .map_err(|e| TodoError::Storage(format!("Failed to update tag {}: {}", tag.id, e)))
        })
    }

    /// Delete a tag; links referencing it cascade.
    pub fn delete(&self, id: TagId) -> Result<usize, TodoError> {
        self.db.write(&[Table::Tags, Table::TaskTags], |conn| {
            conn.execute("DELETE FROM tags WHERE id = ?1", rusqlite::params![id.0])
                .map_err(|e| TodoError::Storage(format!("Failed to delete tag {}: {}", id, e)))
        })
    }

    pub fn all(&self) -> Result<Vec<Tag>, TodoError> {
        self.db.with_conn(queries::all_tags)
    }

    pub fn find_by_id(&self, id: TagId) -> Result<Option<Tag>, TodoError> {
        self.db.with_conn(|conn| queries::find_tag(conn, id))
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Store for category rows.
#[derive(Clone)]
pub struct CategoryStore {
    db: Arc<Database>,
}

impl CategoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, name: &str, color: &str) -> Result<CategoryId, TodoError> {
        self.db.write(&[Table::Categories], |conn| {
            conn.execute(
                "INSERT INTO categories (name, color) VALUES (?1, ?2)",
                rusqlite::params![name, color],
            )
            .map_err(|e| TodoError::Storage(format!("Failed to insert category: {}", e)))?;
            Ok(CategoryId(conn.last_insert_rowid()))
        })
    }

    pub fn update(&self, category: &Category) -> Result<usize, TodoError> {
        self.db.write(&[Table::Categories], |conn| {
            conn.execute(
                "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3",
                rusqlite::params![category.name, category.color, category.id.0],
            )
            .map_err(|e| {
                TodoError::Storage(format!("Failed to update category {}: {}", category.id, e))
            })
        })
    }

    /// Delete a category; tasks referencing it keep existing with no category.
    pub fn delete(&self, id: CategoryId) -> Result<usize, TodoError> {
        self.db.write(&[Table::Categories, Table::Tasks], |conn| {
            conn.execute("DELETE FROM categories WHERE id = ?1", rusqlite::params![id.0])
                .map_err(|e| TodoError::Storage(format!("Failed to delete category {}: {}", id, e)))
        })
    }

    pub fn all(&self) -> Result<Vec<Category>, TodoError> {
        self.db.with_conn(queries::all_categories)
    }
}

// ============================================================================
// Task/tag links
// ============================================================================

/// Store for the task/tag association table.
#[derive(Clone)]
pub struct TaskTagStore {
    db: Arc<Database>,
}

impl TaskTagStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Link a task and a tag. Both must exist and not already be linked.
    pub fn insert(&self, link: TaskTag) -> Result<(), TodoError> {
        self.db.write(&[Table::TaskTags], |conn| {
            conn.execute(
                "INSERT INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                rusqlite::params![link.task_id.0, link.tag_id.0],
            )
            .map_err(|e| TodoError::Storage(format!("Failed to link task tag: {}", e)))?;
            Ok(())
        })
    }

    pub fn delete(&self, link: TaskTag) -> Result<usize, TodoError> {
        self.db.write(&[Table::TaskTags], |conn| {
            conn.execute(
                "DELETE FROM task_tags WHERE task_id = ?1 AND tag_id = ?2",
                rusqlite::params![link.task_id.0, link.tag_id.0],
            )
            .map_err(|e| TodoError::Storage(format!("Failed to unlink task tag: {}", e)))
        })
    }

    pub fn delete_for_task(&self, task_id: TaskId) -> Result<usize, TodoError> {
        self.db
            .write(&[Table::TaskTags], |conn| delete_task_tags(conn, task_id))
    }

    /// Make `tag_ids` the complete tag set of a task, in one transaction.
    pub fn replace_for_task(&self, task_id: TaskId, tag_ids: &[TagId]) -> Result<usize, TodoError> {
        self.db.write(&[Table::TaskTags], |conn| {
            let tx = begin(conn)?;
            let linked = replace_task_tags(&tx, task_id, tag_ids)?;
            commit(tx)?;
            Ok(linked)
        })
    }

    pub fn tags_for_task(&self, task_id: TaskId) -> Result<Vec<Tag>, TodoError> {
        self.db.with_conn(|conn| queries::tags_for_task(conn, task_id))
    }

    pub fn tag_ids_for_task(&self, task_id: TaskId) -> Result<Vec<TagId>, TodoError> {
        self.db
            .with_conn(|conn| queries::tag_ids_for_task(conn, task_id))
    }
}

// ============================================================================
// Shared SQL
// ============================================================================

fn begin(conn: &Connection) -> Result<rusqlite::Transaction<'_>, TodoError> {
    conn.unchecked_transaction()
        .map_err(|e| TodoError::Storage(format!("Failed to begin transaction: {}", e)))
}

fn commit(tx: rusqlite::Transaction<'_>) -> Result<(), TodoError> {
    tx.commit()
        .map_err(|e| TodoError::Storage(format!("Failed to commit transaction: {}", e)))
}

fn insert_task(conn: &Connection, task: &NewTask) -> Result<TaskId, TodoError> {
    conn.execute(
        "INSERT INTO tasks (id, title, description, is_completed, category_id, created_at, deadline)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            task.id.map(|id| id.0),
            task.title,
            task.description,
            task.is_completed,
            task.category_id.map(|id| id.0),
            task.created_at.timestamp_millis(),
            task.deadline.map(|d| d.timestamp_millis()),
        ],
    )
    .map_err(|e| TodoError::Storage(format!("Failed to insert task: {}", e)))?;
    Ok(TaskId(conn.last_insert_rowid()))
}

fn update_task(conn: &Connection, task: &Task) -> Result<usize, TodoError> {
    conn.execute(
        "UPDATE tasks
         SET title = ?1, description = ?2, is_completed = ?3, category_id = ?4,
             created_at = ?5, deadline = ?6
         WHERE id = ?7",
        rusqlite::params![
            task.title,
            task.description,
            task.is_completed,
            task.category_id.map(|id| id.0),
            task.created_at.timestamp_millis(),
            task.deadline.map(|d| d.timestamp_millis()),
            task.id.0,
        ],
    )
    .map_err(|e| TodoError::Storage(format!("Failed to update task {}: {}", task.id, e)))
}

fn delete_task(conn: &Connection, id: TaskId) -> Result<usize, TodoError> {
    conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id.0])
        .map_err(|e| TodoError::Storage(format!("Failed to delete task {}: {}", id, e)))
}

fn delete_task_tags(conn: &Connection, task_id: TaskId) -> Result<usize, TodoError> {
    conn.execute(
        "DELETE FROM task_tags WHERE task_id = ?1",
        rusqlite::params![task_id.0],
    )
    .map_err(|e| TodoError::Storage(format!("Failed to clear task tags: {}", e)))
}

/// Delete every link of `task_id`, then link each of `tag_ids` once.
fn replace_task_tags(conn: &Connection, task_id: TaskId, tag_ids: &[TagId]) -> Result<usize, TodoError> {
    delete_task_tags(conn, task_id)?;

    let mut unique = tag_ids.to_vec();
    unique.sort();
    unique.dedup();

    let mut stmt = conn
        .prepare("INSERT INTO task_tags (task_id, tag_id) VALUES (?1, ?2)")
        .map_err(|e| TodoError::Storage(e.to_string()))?;
    for tag_id in &unique {
        stmt.execute(rusqlite::params![task_id.0, tag_id.0])
            .map_err(|e| TodoError::Storage(format!("Failed to link tag {}: {}", tag_id, e)))?;
    }
    Ok(unique.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use todo_core::types::{SortOrder, TaskStatus};

    use crate::queries::TaskQuery;

    fn make_db() -> Arc<Database> {
        Arc::new(Database::in_memory().unwrap())
    }

    fn task_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
                .map_err(|e| TodoError::Storage(e.to_string()))
        })
        .unwrap()
    }

    fn link_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM task_tags", [], |row| row.get(0))
                .map_err(|e| TodoError::Storage(e.to_string()))
        })
        .unwrap()
    }

    // ========================================================================
    // TaskStore tests
    // ========================================================================

    #[test]
    fn test_task_insert_and_find() {
        let store = TaskStore::new(make_db());
        let new_task = NewTask::new("Test Task").description("Description");
        let id = store.insert(&new_task).unwrap();

        let found = store.find_by_id(id).unwrap().unwrap();
        assert_eq!(found.title, "Test Task");
        assert_eq!(found.description, "Description");
        assert!(!found.is_completed);
        assert_eq!(found.created_at, new_task.created_at);
    }

    #[test]
    fn test_task_insert_with_explicit_id() {
        let store = TaskStore::new(make_db());
        let mut new_task = NewTask::new("Pinned");
        new_task.id = Some(TaskId(40));
        assert_eq!(store.insert(&new_task).unwrap(), TaskId(40));

        // Duplicate ids are rejected.
        assert!(store.insert(&new_task).is_err());
    }

    #[test]
    fn test_task_ids_never_reused() {
        let store = TaskStore::new(make_db());
        let first = store.insert(&NewTask::new("a")).unwrap();
        store.delete(first).unwrap();
        let second = store.insert(&NewTask::new("b")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_task_update_and_missing_update() {
        let store = TaskStore::new(make_db());
        let id = store.insert(&NewTask::new("Before")).unwrap();
        let mut task = store.find_by_id(id).unwrap().unwrap();
        task.title = "After".to_string();
        assert_eq!(store.update(&task).unwrap(), 1);
        assert_eq!(store.find_by_id(id).unwrap().unwrap().title, "After");

        task.id = TaskId(999);
        assert_eq!(store.update(&task).unwrap(), 0);
        assert!(store.find_by_id(TaskId(999)).unwrap().is_none());
    }

    #[test]
    fn test_task_delete_is_idempotent() {
        let db = make_db();
        let store = TaskStore::new(Arc::clone(&db));
        let id = store.insert(&NewTask::new("gone")).unwrap();

        assert_eq!(store.delete(id).unwrap(), 1);
        assert_eq!(store.delete(id).unwrap(), 0);
        assert_eq!(task_count(&db), 0);
    }

    #[test]
    fn test_insert_many_is_atomic() {
        let db = make_db();
        let store = TaskStore::new(Arc::clone(&db));
        let mut clash = NewTask::new("clash");
        clash.id = Some(TaskId(1));

        store.insert(&clash).unwrap();
        let batch = vec![NewTask::new("fresh"), clash];
        assert!(store.insert_many(&batch).is_err());
        assert_eq!(task_count(&db), 1);
    }

    #[test]
    fn test_take_and_restore() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let tags = TagStore::new(Arc::clone(&db));
        let work = tags.insert("Work").unwrap();
        let home = tags.insert("Home").unwrap();
        let id = tasks
            .insert_with_tags(&NewTask::new("undo me"), &[work, home])
            .unwrap();

        let deleted = tasks.take(id).unwrap().unwrap();
        assert_eq!(deleted.tag_ids, vec![work, home]);
        assert_eq!(link_count(&db), 0);
        assert!(tasks.take(id).unwrap().is_none());

        tags.delete(home).unwrap();
        assert_eq!(tasks.restore(&deleted).unwrap(), id);
        let links = TaskTagStore::new(Arc::clone(&db))
            .tag_ids_for_task(id)
            .unwrap();
        assert_eq!(links, vec![work]);
    }

    #[test]
    fn test_restore_clears_deleted_category() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let categories = CategoryStore::new(Arc::clone(&db));
        let work = categories.insert("Work", "#FF6B6B").unwrap();
        let id = tasks
            .insert(&NewTask::new("filed").category(Some(work)))
            .unwrap();

        let deleted = tasks.take(id).unwrap().unwrap();
        assert_eq!(deleted.task.category_id, Some(work));
        categories.delete(work).unwrap();

        assert_eq!(tasks.restore(&deleted).unwrap(), id);
        let restored = tasks.find_by_id(id).unwrap().unwrap();
        assert_eq!(restored.title, "filed");
        assert_eq!(restored.category_id, None);
    }

    #[test]
    fn test_delete_all() {
        let db = make_db();
        let store = TaskStore::new(Arc::clone(&db));
        for i in 0..3 {
            store.insert(&NewTask::new(format!("t{}", i))).unwrap();
        }
        assert_eq!(store.delete_all().unwrap(), 3);
        assert_eq!(task_count(&db), 0);
    }

    #[test]
    fn test_completion_moves_between_partitions() {
        let db = make_db();
        let store = TaskStore::new(Arc::clone(&db));
        let id = store.insert(&NewTask::new("flip")).unwrap();

        store.set_completed(id, true).unwrap();
        let active = db
            .with_conn(|conn| TaskQuery::active(SortOrder::Newest).run(conn))
            .unwrap();
        let completed = db
            .with_conn(|conn| {
                TaskQuery::search(TaskStatus::Completed, "", SortOrder::Newest).run(conn)
            })
            .unwrap();
        assert!(active.is_empty());
        assert_eq!(completed.len(), 1);
    }

    // ========================================================================
    // TagStore / TaskTagStore tests
    // ========================================================================

    #[test]
    fn test_tag_delete_cascades_links() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let tags = TagStore::new(Arc::clone(&db));
        let links = TaskTagStore::new(Arc::clone(&db));

        let tag = tags.insert("Urgent").unwrap();
        for i in 0..4 {
            let id = tasks.insert(&NewTask::new(format!("t{}", i))).unwrap();
            links.insert(TaskTag { task_id: id, tag_id: tag }).unwrap();
        }
        assert_eq!(link_count(&db), 4);

        assert_eq!(tags.delete(tag).unwrap(), 1);
        assert_eq!(link_count(&db), 0);
        assert_eq!(task_count(&db), 4);
    }

    #[test]
    fn test_tag_insert_reuses_existing_name() {
        let tags = TagStore::new(make_db());
        let (work, created) = tags.find_or_insert("Work").unwrap();
        assert!(created);
        assert_eq!(tags.find_or_insert("Work").unwrap(), (work, false));
        assert_eq!(tags.insert("Work").unwrap(), work);
        assert_eq!(tags.all().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_missing_tags() {
        let tags = TagStore::new(make_db());
        tags.insert("Work").unwrap();

        let created = tags.insert_missing(&["Work", "Home", "Home"]).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(tags.all().unwrap().len(), 2);
        assert!(tags.insert_missing(&["Work", "Home"]).unwrap().is_empty());
    }

    #[test]
    fn test_tag_update() {
        let tags = TagStore::new(make_db());
        let id = tags.insert("Wrok").unwrap();
        tags.update(&Tag { id, name: "Work".to_string() }).unwrap();
        assert_eq!(tags.find_by_id(id).unwrap().unwrap().name, "Work");
    }

    #[test]
    fn test_link_requires_existing_rows() {
        let db = make_db();
        let links = TaskTagStore::new(Arc::clone(&db));
        let result = links.insert(TaskTag {
            task_id: TaskId(1),
            tag_id: TagId(1),
        });
        assert!(matches!(result, Err(TodoError::Storage(_))));
    }

    #[test]
    fn test_replace_for_task() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let tags = TagStore::new(Arc::clone(&db));
        let links = TaskTagStore::new(Arc::clone(&db));

        let a = tags.insert("A").unwrap();
        let b = tags.insert("B").unwrap();
        let c = tags.insert("C").unwrap();
        let task = tasks.insert_with_tags(&NewTask::new("t"), &[a, b]).unwrap();

        assert_eq!(links.replace_for_task(task, &[b, c, c]).unwrap(), 2);
        assert_eq!(links.tag_ids_for_task(task).unwrap(), vec![b, c]);

        assert_eq!(links.delete(TaskTag { task_id: task, tag_id: b }).unwrap(), 1);
        assert_eq!(links.tags_for_task(task).unwrap()[0].name, "C");
        assert_eq!(links.delete_for_task(task).unwrap(), 1);
    }

    #[test]
    fn test_failed_replace_keeps_old_links() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let tags = TagStore::new(Arc::clone(&db));
        let links = TaskTagStore::new(Arc::clone(&db));

        let a = tags.insert("A").unwrap();
        let task = tasks.insert_with_tags(&NewTask::new("t"), &[a]).unwrap();

        // Tag 99 does not exist, so the whole replacement rolls back.
        assert!(links.replace_for_task(task, &[TagId(99)]).is_err());
        assert_eq!(links.tag_ids_for_task(task).unwrap(), vec![a]);
    }

    // ========================================================================
    // CategoryStore tests
    // ========================================================================

    #[test]
    fn test_category_delete_keeps_tasks() {
        let db = make_db();
        let tasks = TaskStore::new(Arc::clone(&db));
        let categories = CategoryStore::new(Arc::clone(&db));

        let work = categories.insert("Work", "#FF6B6B").unwrap();
        let ids: Vec<_> = (0..3)
            .map(|i| {
                tasks
                    .insert(&NewTask::new(format!("t{}", i)).category(Some(work)))
                    .unwrap()
            })
            .collect();

        assert_eq!(categories.delete(work).unwrap(), 1);
        for id in ids {
            assert_eq!(tasks.find_by_id(id).unwrap().unwrap().category_id, None);
        }
        assert!(categories.all().unwrap().is_empty());
    }

    #[test]
    fn test_category_update() {
        let categories = CategoryStore::new(make_db());
        let id = categories.insert("Home", "#4ECDC4").unwrap();
        let renamed = Category {
            id,
            name: "House".to_string(),
            color: "#000000".to_string(),
        };
        assert_eq!(categories.update(&renamed).unwrap(), 1);
        assert_eq!(categories.all().unwrap(), vec![renamed]);
    }
}
