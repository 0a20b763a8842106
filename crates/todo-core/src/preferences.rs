//! Persisted user preferences.
//!
//! A single private namespace (`<data_dir>/prefs/theme_prefs.toml`) holding
//! the dark/light mode flag. Read at startup and on every toggle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

const PREFS_DIR: &str = "prefs";
const THEME_FILE: &str = "theme_prefs.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct ThemePrefs {
    dark_mode: bool,
}

/// File-backed store for the theme preference.
#[derive(Debug, Clone)]
pub struct ThemePreference {
    path: PathBuf,
}

impl ThemePreference {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PREFS_DIR).join(THEME_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current choice; light mode when nothing was stored or the file is unreadable.
    pub fn is_dark_mode(&self) -> bool {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match toml::from_str::<ThemePrefs>(&content) {
                Ok(prefs) => prefs.dark_mode,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Unreadable theme preference");
                    false
                }
            },
            Err(_) => false,
        }
    }

    pub fn set_dark_mode(&self, dark_mode: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(&ThemePrefs { dark_mode })?;
        std::fs::write(&self.path, content)?;
        debug!(dark_mode, "Theme preference stored");
        Ok(())
    }

    /// Flip the stored flag and return the new value.
    pub fn toggle(&self) -> Result<bool> {
        let next = !self.is_dark_mode();
        self.set_dark_mode(next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_light_mode() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = ThemePreference::new(dir.path());
        assert!(!prefs.is_dark_mode());
    }

    #[test]
    fn test_set_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = ThemePreference::new(dir.path());
        prefs.set_dark_mode(true).unwrap();
        assert!(prefs.is_dark_mode());
        assert!(prefs.path().exists());

        // A second handle over the same directory sees the stored value.
        assert!(ThemePreference::new(dir.path()).is_dark_mode());
    }

    #[test]
    fn test_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = ThemePreference::new(dir.path());
        assert!(prefs.toggle().unwrap());
        assert!(!prefs.toggle().unwrap());
        assert!(!prefs.is_dark_mode());
    }

    #[test]
    fn test_corrupt_file_reads_as_light() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = ThemePreference::new(dir.path());
        std::fs::create_dir_all(prefs.path().parent().unwrap()).unwrap();
        std::fs::write(prefs.path(), "dark_mode = \"maybe\"").unwrap();
        assert!(!prefs.is_dark_mode());
    }
}
