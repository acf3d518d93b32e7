//! CLI command handlers.

mod add;
mod client;
mod config;
mod enqueue;
mod normalize;
mod reset;
mod status;
mod watch;

pub use add::run_add_command;
pub use client::{run_client_list_command, run_client_status_command, run_client_task_command};
pub use config::run_config_show_command;
pub use enqueue::run_enqueue_command;
pub use normalize::run_normalize_command;
pub use reset::run_reset_command;
pub use status::run_status_command;
pub use watch::run_watch_command;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mediadl_core::{Config, Database, Queue, Registry};

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("failed to load config")
}

async fn open_queue(config: &Config) -> Result<Queue> {
    let path = config.database_path();
    let db = Database::new(&path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Queue::new(db))
}

fn build_registry(config: &Config) -> Result<Registry> {
    Registry::from_config(config).context("failed to build clients / sites from config")
}

/// Asks a yes/no question on stdout; anything but `y`/`yes` is a no.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/N)? ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
