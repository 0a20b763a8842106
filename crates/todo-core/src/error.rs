use thiserror::Error;

/// Top-level error type for the todo system.
///
/// Storage and codec failures carry a formatted message so that the
/// underlying driver error never leaks into callers' signatures. The
/// backup codec has its own user-facing error type in `todo-storage`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TodoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TodoError {
    /// Shorthand for a validation failure on a named input field.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        TodoError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for TodoError {
    fn from(err: toml::de::Error) -> Self {
        TodoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TodoError {
    fn from(err: toml::ser::Error) -> Self {
        TodoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TodoError {
    fn from(err: serde_json::Error) -> Self {
        TodoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for todo operations.
pub type Result<T> = std::result::Result<T, TodoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = TodoError::validation("title", "enter a title");
        assert_eq!(err.to_string(), "Validation failed for title: enter a title");
    }

    #[test]
    fn test_missing_backup_file_reads_as_io() {
        let err: TodoError = std::fs::read_to_string("/nonexistent/tasks_backup_1.json")
            .unwrap_err()
            .into();
        assert!(matches!(err, TodoError::Io(_)));
    }

    #[test]
    fn test_bad_config_maps_to_config_error() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("[general\nlog_level =");
        let err: TodoError = parsed.unwrap_err().into();
        assert!(matches!(err, TodoError::Config(_)));
        assert!(err.to_string().starts_with("Configuration error: "));
    }

    #[test]
    fn test_bad_export_maps_to_serialization_error() {
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str("{\"tasks\": [");
        let err: TodoError = parsed.unwrap_err().into();
        assert!(matches!(err, TodoError::Serialization(_)));
    }

    #[test]
    fn test_not_found_and_backup_messages() {
        assert_eq!(
            TodoError::NotFound("task 7".to_string()).to_string(),
            "Not found: task 7"
        );
        assert_eq!(
            TodoError::Backup("No backups found in /tmp".to_string()).to_string(),
            "Backup error: No backups found in /tmp"
        );
    }
}
