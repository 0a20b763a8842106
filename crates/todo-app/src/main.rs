//! Todo application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite database and build the repository and backup service
//! 4. Start the widget feed and run the optional startup export
//! 5. Dispatch the subcommand (default: list active tasks)

mod cli;
mod commands;
mod reminders;
mod widget;

use std::sync::Arc;

use clap::Parser;

use todo_core::config::TodoConfig;
use todo_core::types::SortOrder;

use cli::{CliArgs, Command};
use commands::App;
use widget::WidgetFeed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = TodoConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::debug!("Starting todo v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let app = match App::open(config) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open the task database");
            return Err(e.into());
        }
    };

    // Widget feed.
    let feed = if app.config.widget.enabled {
        let path = app.data_dir().join(&app.config.widget.file_name);
        let feed = WidgetFeed::spawn(Arc::clone(&app.repo), path, app.config.widget.max_items)?;
        app.repo.add_listener(feed.listener());
        feed.refresh();
        Some(feed)
    } else {
        None
    };

    if app.config.storage.auto_export_on_start {
        match app.backups.export_active_tasks().await {
            Ok(path) => tracing::info!(path = %path.display(), "Startup export written"),
            Err(e) => tracing::warn!(error = %e, "Startup export failed"),
        }
    }

    let command = args.command.unwrap_or(Command::List {
        completed: false,
        sort: SortOrder::Newest,
        search: None,
        from: None,
        json: false,
    });
    let outcome = commands::execute(&app, command).await;

    if let Some(feed) = feed {
        feed.shutdown();
    }

    if let Err(e) = outcome {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
