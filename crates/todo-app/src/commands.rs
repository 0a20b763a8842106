//! Subcommand handlers.
//!
//! Every handler works through the repository or the backup service held
//! by [`App`] and prints its result to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};

use todo_core::config::TodoConfig;
use todo_core::error::TodoError;
use todo_core::preferences::ThemePreference;
use todo_core::types::{
    Category, CategoryId, DeletedTask, SortOrder, Tag, TagId, Task, TaskDraft, TaskId,
    TaskStatus, TaskWithTags,
};
use todo_storage::{BackupService, Database, TaskQuery, TaskRepository};

use crate::cli::{parse_deadline, CategoryAction, CliArgs, Command, TagAction, ThemeMode};
use crate::reminders::{format_reminder, ReminderScheduler};

const LAST_DELETED_FILE: &str = "last_deleted.json";

/// Everything a command needs, built once per process.
pub struct App {
    pub repo: Arc<TaskRepository>,
    pub backups: BackupService,
    pub theme: ThemePreference,
    pub config: TodoConfig,
    data_dir: PathBuf,
}

impl App {
    /// Open the database under the configured data directory.
    pub fn open(config: TodoConfig) -> Result<Self, TodoError> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let db_path = config.database_path();
        let db = Arc::new(Database::new(&db_path)?);
        info!(path = %db_path.display(), "Database opened");
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: TodoConfig, db: Arc<Database>) -> Self {
        let data_dir = config.data_dir();
        let repo = Arc::new(TaskRepository::new(db));
        let backups = BackupService::new(
            Arc::clone(&repo),
            config.backup_dir(),
            config.storage.database_name.clone(),
        );
        Self {
            repo,
            backups,
            theme: ThemePreference::new(&data_dir),
            config,
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn last_deleted_path(&self) -> PathBuf {
        self.data_dir.join(LAST_DELETED_FILE)
    }
}

/// Run one subcommand.
pub async fn execute(app: &App, command: Command) -> Result<(), TodoError> {
    match command {
        Command::Watch => watch(app).await,
        other => run(app, other).await,
    }
}

async fn run(app: &App, command: Command) -> Result<(), TodoError> {
    debug!(command = ?command, "Executing command");
    match command {
        Command::Add {
            title,
            description,
            due,
            tags,
            category,
        } => {
            let draft = TaskDraft {
                title,
                description: description.unwrap_or_default(),
                deadline: due.as_deref().map(deadline_arg).transpose()?,
                category_id: category.map(CategoryId),
                tag_ids: resolve_tag_ids(&app.repo, &tags).await?,
            };
            let id = app.repo.create_task(draft).await?;
            println!("Added task {}", id);
        }

        Command::Edit {
            id,
            title,
            description,
            due,
            no_due,
            tags,
            no_tags,
            category,
            no_category,
        } => {
            let id = TaskId(id);
            let task = find_existing(&app.repo, id).await?;
            let tag_ids = if no_tags {
                Vec::new()
            } else if tags.is_empty() {
                app.repo.task_tag_ids(id).await?
            } else {
                resolve_tag_ids(&app.repo, &tags).await?
            };
            let deadline = match (no_due, due) {
                (true, _) => None,
                (false, Some(due)) => Some(deadline_arg(&due)?),
                (false, None) => task.deadline,
            };
            let category_id = match (no_category, category) {
                (true, _) => None,
                (false, Some(category)) => Some(CategoryId(category)),
                (false, None) => task.category_id,
            };
            let draft = TaskDraft {
                title: title.unwrap_or(task.title),
                description: description.unwrap_or(task.description),
                deadline,
                category_id,
                tag_ids,
            };
            if !app.repo.edit_task(id, draft).await? {
                return Err(task_not_found(id));
            }
            println!("Updated task {}", id);
        }

        Command::List {
            completed,
            sort,
            search,
            from,
            json,
        } => {
            let status = if completed {
                TaskStatus::Completed
            } else {
                TaskStatus::Active
            };
            let query = match (from, search) {
                (Some(from), _) => TaskQuery::due_from(deadline_arg(&from)?),
                (None, Some(text)) => TaskQuery::search(status, text, sort),
                (None, None) => TaskQuery::ByStatus {
                    status,
                    order: sort,
                },
            };
            let tasks = app.repo.query_tasks(query).await?;
            let tasks = app.repo.with_tags(tasks).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }

        Command::Done { id } => set_completed(app, TaskId(id), true).await?,
        Command::Reopen { id } => set_completed(app, TaskId(id), false).await?,

        Command::Toggle { id } => {
            let id = TaskId(id);
            match app.repo.toggle_completed(id).await? {
                Some(true) => println!("Task {} completed", id),
                Some(false) => println!("Task {} reopened", id),
                None => return Err(task_not_found(id)),
            }
        }

        Command::Delete { id } => {
            let id = TaskId(id);
            let deleted = app
                .repo
                .delete_task(id)
                .await?
                .ok_or_else(|| task_not_found(id))?;
            save_last_deleted(&app.last_deleted_path(), &deleted)?;
            println!("Deleted task {} \"{}\" (run `todo undo` to restore)", id, deleted.task.title);
        }

        Command::Undo => {
            let path = app.last_deleted_path();
            let deleted = load_last_deleted(&path)?
                .ok_or_else(|| TodoError::NotFound("nothing to undo".to_string()))?;
            let id = app.repo.restore_task(deleted).await?;
            std::fs::remove_file(&path)?;
            println!("Restored task {}", id);
        }

        Command::Clear { yes } => {
            let stats = app.repo.stats().await?;
            if !yes {
                println!(
                    "This deletes all {} tasks. Run again with --yes to confirm.",
                    stats.total()
                );
                return Ok(());
            }
            let removed = app.repo.delete_all_tasks().await?;
            println!("Deleted {} tasks", removed);
        }

        Command::Tag { action } => match action.unwrap_or(TagAction::List) {
            TagAction::List => {
                let tags = app.repo.ensure_default_tags().await?;
                print_tags(&tags);
            }
            TagAction::Add { name } => {
                let id = app.repo.insert_tag(&name).await?;
                println!("Added tag {}", id);
            }
            TagAction::Delete { id } => {
                let id = TagId(id);
                let name = app.repo.tag_name(id).await;
                if app.repo.delete_tag(id).await? == 0 {
                    return Err(TodoError::NotFound(format!("tag {}", id)));
                }
                println!("Deleted tag {} \"{}\"", id, name);
            }
        },

        Command::Category { action } => match action.unwrap_or(CategoryAction::List) {
            CategoryAction::List => print_categories(&app.repo.all_categories().await?),
            CategoryAction::Add { name, color } => {
                let id = app.repo.insert_category(&name, &color).await?;
                println!("Added category {}", id);
            }
            CategoryAction::Delete { id } => {
                let id = CategoryId(id);
                if app.repo.delete_category(id).await? == 0 {
                    return Err(TodoError::NotFound(format!("category {}", id)));
                }
                println!("Deleted category {}", id);
            }
        },

        Command::Export => {
            let path = app.backups.export_active_tasks().await?;
            println!("Exported active tasks to {}", path.display());
        }

        Command::Import { path } => {
            let (path, count) = match path {
                Some(path) => (path.clone(), app.backups.import_file(path).await?),
                None => app.backups.import_latest().await?,
            };
            println!("Imported {} tasks from {}", count, path.display());
        }

        Command::Backup => {
            let path = app.backups.backup_database().await?;
            println!("Database backed up to {}", path.display());
        }

        Command::Restore { yes } => {
            if !yes {
                println!("This replaces every task with the newest snapshot. Run again with --yes to confirm.");
                return Ok(());
            }
            let source = app.backups.restore_database().await?;
            println!("Database restored from {}", source.display());
        }

        Command::Backups => {
            let files = app.backups.list_backups().await?;
            if files.is_empty() {
                println!("No backups in {}", app.backups.dir().display());
            }
            for file in files {
                println!("{}", file.display());
            }
        }

        Command::Stats => {
            let stats = app.repo.stats().await?;
            println!("Active:    {}", stats.active);
            println!("Completed: {}", stats.completed);
            println!("Total:     {}", stats.total());
        }

        Command::Remind { minutes } => {
            let minutes = minutes.unwrap_or(app.config.reminders.lookahead_minutes);
            let now = Utc::now();
            let due = app
                .repo
                .upcoming_deadlines(now, Duration::minutes(i64::from(minutes)))
                .await?;
            if due.is_empty() {
                println!("Nothing due in the next {} minutes", minutes);
            }
            for task in &due {
                println!("{}", format_reminder(task, now));
            }
        }

        Command::Seed { count } => {
            let ids = app.repo.seed_tasks(count).await?;
            println!("Inserted {} test tasks", ids.len());
        }

        Command::Theme { mode } => {
            let dark = match mode {
                None => app.theme.is_dark_mode(),
                Some(ThemeMode::Dark) => {
                    app.theme.set_dark_mode(true)?;
                    true
                }
                Some(ThemeMode::Light) => {
                    app.theme.set_dark_mode(false)?;
                    false
                }
                Some(ThemeMode::Toggle) => app.theme.toggle()?,
            };
            println!("{}", if dark { "dark" } else { "light" });
        }

        Command::Watch => {
            return Err(TodoError::validation("command", "already watching"));
        }
    }
    Ok(())
}

// ============================================================================
// Watch session
// ============================================================================

/// Print the active list on every change and reminders as they come due.
///
/// Lines typed on stdin run as commands against the same database, so the
/// list updates as they are applied. Ends on Ctrl+C or end of input.
async fn watch(app: &App) -> Result<(), TodoError> {
    let mut active = app.repo.active_tasks(SortOrder::Deadline)?;
    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::clone(&app.repo),
        &app.config.reminders,
    ));
    let reminders = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler
                .run(|task| println!("{}", format_reminder(task, Utc::now())))
                .await
        })
    };

    println!("Watching active tasks. Type a command (e.g. `add \"Buy milk\"`), Ctrl+C to stop.");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            next = active.next() => {
                let Some(tasks) = next else { break };
                println!("--- {} active ---", tasks.len());
                print_tasks(&app.repo.with_tags(tasks).await?);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Err(e) = run_line(app, &line).await {
                    println!("{}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    scheduler.shutdown();
    let _ = reminders.await;
    info!("Watch session ended");
    Ok(())
}

async fn run_line(app: &App, line: &str) -> Result<(), TodoError> {
    let words = split_words(line);
    if words.is_empty() {
        return Ok(());
    }
    let args = std::iter::once("todo".to_string()).chain(words);
    match CliArgs::try_parse_from(args) {
        Ok(CliArgs {
            command: Some(command),
            ..
        }) => run(app, command).await,
        Ok(_) => Ok(()),
        Err(e) => {
            println!("{}", e);
            Ok(())
        }
    }
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    words.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        words.push(current);
    }
    words
}

// ============================================================================
// Helpers
// ============================================================================

async fn set_completed(app: &App, id: TaskId, is_completed: bool) -> Result<(), TodoError> {
    if app.repo.set_completed(id, is_completed).await? == 0 {
        return Err(task_not_found(id));
    }
    let verb = if is_completed { "completed" } else { "reopened" };
    println!("Task {} {}", id, verb);
    Ok(())
}

async fn find_existing(repo: &TaskRepository, id: TaskId) -> Result<Task, TodoError> {
    repo.find_task(id).await?.ok_or_else(|| task_not_found(id))
}

fn task_not_found(id: TaskId) -> TodoError {
    TodoError::NotFound(format!("task {}", id))
}

fn deadline_arg(input: &str) -> Result<DateTime<Utc>, TodoError> {
    parse_deadline(input).map_err(|message| TodoError::validation("deadline", message))
}

/// Map tag names to ids, case-insensitively. Unknown names become new tags.
pub async fn resolve_tag_ids(
    repo: &TaskRepository,
    names: &[String],
) -> Result<Vec<TagId>, TodoError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let mut known = repo.ensure_default_tags().await?;
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let wanted = name.trim();
        let existing = known
            .iter()
            .find(|tag| tag.name.eq_ignore_ascii_case(wanted))
            .map(|tag| tag.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = repo.insert_tag(wanted).await?;
                known.push(Tag {
                    id,
                    name: wanted.to_string(),
                });
                id
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

fn save_last_deleted(path: &Path, deleted: &DeletedTask) -> Result<(), TodoError> {
    let content = serde_json::to_string(deleted)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn load_last_deleted(path: &Path) -> Result<Option<DeletedTask>, TodoError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_tasks(tasks: &[TaskWithTags]) {
    if tasks.is_empty() {
        println!("No tasks");
    }
    for task in tasks {
        println!("{}", format_task_line(task));
    }
}

/// `[x]   12  Title  due 2025-03-10 23:59  #Work #Home`
pub fn format_task_line(item: &TaskWithTags) -> String {
    let task = &item.task;
    let mut line = format!(
        "[{}] {:>4}  {}",
        if task.is_completed { 'x' } else { ' ' },
        task.id.0,
        task.title
    );
    if let Some(deadline) = task.deadline {
        line.push_str(&format!(
            "  due {}",
            deadline.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        ));
    }
    for tag in &item.tags {
        line.push_str(&format!(" #{}", tag));
    }
    line
}

fn print_tags(tags: &[Tag]) {
    for tag in tags {
        println!("{:>4}  {}", tag.id.0, tag.name);
    }
}

fn print_categories(categories: &[Category]) {
    if categories.is_empty() {
        println!("No categories");
    }
    for category in categories {
        println!("{:>4}  {}  {}", category.id.0, category.color, category.name);
    }
}
