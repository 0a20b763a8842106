pub mod config;
pub mod error;
pub mod events;
pub mod preferences;
pub mod types;
pub mod validation;

pub use config::TodoConfig;
pub use error::{Result, TodoError};
pub use events::ChangeEvent;
pub use preferences::ThemePreference;
pub use types::*;
