//! CLI entry point for mediadl.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, ClientAction, Command, ConfigAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let config = commands::load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Watch(args) => {
            let result = commands::run_watch_command(&config, &args).await;
            // A blocking stdin read cannot be cancelled and would hold
            // runtime shutdown until the next line.
            if let Err(err) = result {
                eprintln!("Error: {err:?}");
                std::process::exit(1);
            }
            std::process::exit(0);
        }
        Command::Status(args) => commands::run_status_command(&config, &args).await,
        Command::Reset(args) => commands::run_reset_command(&config, &args).await,
        Command::Enqueue(args) => commands::run_enqueue_command(&config, &args).await,
        Command::Add(args) => commands::run_add_command(&config, &args).await,
        Command::Client(args) => match &args.action {
            ClientAction::List => commands::run_client_list_command(&config, &args.client).await,
            ClientAction::Status => {
                commands::run_client_status_command(&config, &args.client).await
            }
            ClientAction::Pause { ids }
            | ClientAction::Resume { ids }
            | ClientAction::Delete { ids } => {
                commands::run_client_task_command(&config, &args.client, &args.action, ids).await
            }
        },
        Command::Normalize(args) => commands::run_normalize_command(&config, &args).await,
        Command::Config(args) => match args.action {
            ConfigAction::Show => commands::run_config_show_command(&config),
        },
    }
}
