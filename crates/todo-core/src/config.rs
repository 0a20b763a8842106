use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TodoError};

/// Top-level configuration for the todo application.
///
/// Loaded from `~/.todo/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub widget: WidgetConfig,
}

impl TodoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TodoConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TodoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir()
            .join(format!("{}.db", self.storage.database_name))
    }

    /// Directory holding JSON exports and database snapshots.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir().join(&self.storage.backup_dir)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the database, backups and preferences.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.todo/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Database and backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file stem; snapshots are named `<database_name>_<time>.db`.
    pub database_name: String,
    /// Backup directory, relative to the data directory.
    pub backup_dir: String,
    /// Write a JSON export of the active tasks every time the app starts.
    pub auto_export_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_name: "task_database".to_string(),
            backup_dir: "backups".to_string(),
            auto_export_on_start: false,
        }
    }
}

/// Deadline reminder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Remind about active tasks due within this many minutes.
    pub lookahead_minutes: u32,
    /// Seconds between reminder checks while watching.
    pub check_interval_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lookahead_minutes: 60,
            check_interval_secs: 60,
        }
    }
}

/// Home-screen widget feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Keep the widget snapshot file current.
    pub enabled: bool,
    /// Snapshot file name inside the data directory.
    pub file_name: String,
    /// Maximum number of tasks written to the snapshot.
    pub max_items: usize,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "widget.json".to_string(),
            max_items: 20,
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TodoConfig::default();
        assert_eq!(config.general.data_dir, "~/.todo/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.database_name, "task_database");
        assert_eq!(config.storage.backup_dir, "backups");
        assert_eq!(config.reminders.lookahead_minutes, 60);
        assert!(config.widget.enabled);
        assert_eq!(config.widget.max_items, 20);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"

[storage]
database_name = "tasks"
backup_dir = "snapshots"
auto_export_on_start = true

[reminders]
lookahead_minutes = 30
"#;
        let file = create_temp_config(content);
        let config = TodoConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.storage.database_name, "tasks");
        assert!(config.storage.auto_export_on_start);
        assert_eq!(config.reminders.lookahead_minutes, 30);
        // Omitted fields keep their defaults.
        assert_eq!(config.reminders.check_interval_secs, 60);
        assert_eq!(config.widget.file_name, "widget.json");
    }

    #[test]
    fn test_paths_derive_from_data_dir() {
        let mut config = TodoConfig::default();
        config.general.data_dir = "/var/todo".to_string();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/todo/task_database.db")
        );
        assert_eq!(config.backup_dir(), PathBuf::from("/var/todo/backups"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = TodoConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[general\nbroken");
        let err = TodoConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, TodoError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TodoConfig::default();
        config.widget.max_items = 5;
        config.save(&path).unwrap();

        let reloaded = TodoConfig::load(&path).unwrap();
        assert_eq!(reloaded.widget.max_items, 5);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = TodoConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.database_name, "task_database");
        assert_eq!(config.reminders.check_interval_secs, 60);
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/todo"), PathBuf::from("/tmp/todo"));
        assert!(!expand_home("~/todo").starts_with("~"));
    }
}
