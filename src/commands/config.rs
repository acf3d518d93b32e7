//! Config command handlers: show effective configuration.

use anyhow::{Context, Result};
use mediadl_core::Config;

pub fn run_config_show_command(config: &Config) -> Result<()> {
    let resolved_path = config.source.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("# config_path = {resolved_path}");
    println!(
        "# config_file = {}",
        if config.source.as_ref().is_some_and(|path| path.exists()) {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("# database = {}", config.database_path().display());
    let clients: Vec<String> = config
        .client_configs()
        .into_iter()
        .map(|client| client.name)
        .collect();
    println!("# clients = {}", clients.join(", "));
    println!();
    print!("{}", config.to_toml().context("failed to render config")?);
    Ok(())
}
