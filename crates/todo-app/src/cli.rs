//! CLI argument definitions for the todo application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use todo_core::types::SortOrder;

/// todo: a personal task manager with tags, deadlines, reminders and backups.
#[derive(Parser, Debug)]
#[command(name = "todo", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the database, backups and preferences.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a task
    Add {
        /// Task title (quoted if it has spaces)
        title: String,
        /// Longer description
        #[arg(short = 'm', long)]
        description: Option<String>,
        /// Deadline: YYYY-MM-DD (end of that day), "YYYY-MM-DD HH:MM", or RFC 3339
        #[arg(long)]
        due: Option<String>,
        /// Tag name; repeat for several. Unknown names are created.
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Category id
        #[arg(long)]
        category: Option<i64>,
    },

    /// Edit a task; omitted fields keep their value
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short = 'm', long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "no_due")]
        due: Option<String>,
        /// Remove the deadline
        #[arg(long)]
        no_due: bool,
        /// Replace the tag set; repeat for several
        #[arg(short, long = "tag", conflicts_with = "no_tags")]
        tags: Vec<String>,
        /// Remove every tag
        #[arg(long)]
        no_tags: bool,
        #[arg(long, conflicts_with = "no_category")]
        category: Option<i64>,
        /// Remove the category
        #[arg(long)]
        no_category: bool,
    },

    /// List tasks
    List {
        /// Show completed tasks instead of active ones
        #[arg(long)]
        completed: bool,
        /// Sort order: newest, title, deadline
        #[arg(short, long, default_value = "newest")]
        sort: SortOrder,
        /// Only titles containing this text (case-insensitive)
        #[arg(long)]
        search: Option<String>,
        /// Only tasks (any status) with a deadline on or after this date
        #[arg(long, conflicts_with_all = ["completed", "search"])]
        from: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Mark a task completed
    Done { id: i64 },

    /// Mark a task active again
    Reopen { id: i64 },

    /// Flip a task's completion
    Toggle { id: i64 },

    /// Delete a task (revert with `undo`)
    Delete { id: i64 },

    /// Restore the most recently deleted task
    Undo,

    /// Delete every task
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: Option<TagAction>,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: Option<CategoryAction>,
    },

    /// Export active tasks to JSON
    Export,

    /// Import tasks from a JSON export (newest export when no path is given)
    Import { path: Option<PathBuf> },

    /// Snapshot the database file
    Backup,

    /// Replace the database with the newest snapshot
    Restore {
        /// Confirm the replacement
        #[arg(long)]
        yes: bool,
    },

    /// List backup files, newest first
    Backups,

    /// Show task counts
    Stats,

    /// Show active tasks due soon
    Remind {
        /// Look-ahead window in minutes (defaults to the configured value)
        #[arg(long)]
        minutes: Option<u32>,
    },

    /// Insert numbered test tasks, every other one completed
    Seed {
        #[arg(default_value_t = 100)]
        count: usize,
    },

    /// Show or change the theme
    Theme { mode: Option<ThemeMode> },

    /// Follow the active task list and deadline reminders until Ctrl+C
    Watch,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TagAction {
    /// List tags (creates the default set on first use)
    List,
    /// Create a tag
    Add { name: String },
    /// Delete a tag; tasks lose it
    Delete { id: i64 },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CategoryAction {
    List,
    /// Create a category with a #RRGGBB color
    Add {
        name: String,
        #[arg(default_value = "#4ECDC4")]
        color: String,
    },
    /// Delete a category; its tasks become uncategorized
    Delete { id: i64 },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Dark,
    Light,
    Toggle,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > TODO_CONFIG env var > platform default (~/.todo/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("TODO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory path.
    ///
    /// Priority: --data-dir flag > config file value.
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".todo").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".todo").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Parse a deadline given on the command line.
///
/// A bare date means the last second of that local day.
pub fn parse_deadline(input: &str) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive, input);
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
        return local_to_utc(date.and_time(end_of_day), input);
    }
    Err(format!(
        "invalid date '{}': expected YYYY-MM-DD, \"YYYY-MM-DD HH:MM\" or RFC 3339",
        input
    ))
}

fn local_to_utc(naive: NaiveDateTime, input: &str) -> Result<DateTime<Utc>, String> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| format!("'{}' does not exist in the local time zone", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand() {
        let args = CliArgs::parse_from(["todo"]);
        assert!(args.command.is_none());
        assert!(args.config.is_none());
    }

    #[test]
    fn test_add_with_tags() {
        let args = CliArgs::parse_from([
            "todo", "add", "Write report", "--due", "2025-12-01", "-t", "Work", "-t", "Urgent",
        ]);
        match args.command {
            Some(Command::Add {
                title, due, tags, ..
            }) => {
                assert_eq!(title, "Write report");
                assert_eq!(due.as_deref(), Some("2025-12-01"));
                assert_eq!(tags, vec!["Work", "Urgent"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_list_sort_parses() {
        let args = CliArgs::parse_from(["todo", "list", "--sort", "deadline", "--completed"]);
        assert_eq!(
            args.command,
            Some(Command::List {
                completed: true,
                sort: SortOrder::Deadline,
                search: None,
                from: None,
                json: false,
            })
        );
    }

    #[test]
    fn test_edit_conflicting_flags_rejected() {
        let result = CliArgs::try_parse_from(["todo", "edit", "1", "--due", "2025-01-01", "--no-due"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["todo", "stats", "--data-dir", "/tmp/todo"]);
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/todo"));
    }

    #[test]
    fn test_resolve_config_path_flag() {
        let args = CliArgs::parse_from(["todo", "--config", "/etc/todo.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/todo.toml"));
    }

    #[test]
    fn test_seed_default_count() {
        let args = CliArgs::parse_from(["todo", "seed"]);
        assert_eq!(args.command, Some(Command::Seed { count: 100 }));
    }

    #[test]
    fn test_theme_mode() {
        let args = CliArgs::parse_from(["todo", "theme", "dark"]);
        assert_eq!(
            args.command,
            Some(Command::Theme {
                mode: Some(ThemeMode::Dark)
            })
        );
    }

    #[test]
    fn test_parse_deadline_date_is_end_of_day() {
        let deadline = parse_deadline("2025-03-10").unwrap().with_timezone(&Local);
        assert_eq!(deadline.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!((deadline.hour(), deadline.minute(), deadline.second()), (23, 59, 59));
    }

    #[test]
    fn test_parse_deadline_rfc3339() {
        let deadline = parse_deadline("2025-03-10T08:00:00Z").unwrap();
        assert_eq!(deadline.hour(), 8);
    }

    #[test]
    fn test_parse_deadline_rejects_garbage() {
        assert!(parse_deadline("next tuesday").is_err());
        assert!(parse_deadline("2025-13-40").is_err());
    }
}
