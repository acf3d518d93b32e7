//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mediadl_core::config::LOCAL_CLIENT;
use mediadl_core::watch::{DEFAULT_INTERVAL, DEFAULT_MAX_DOWNLOADS};

/// Queue-driven media acquisition.
///
/// Feeds a download client from a persisted queue and normalizes
/// finished download directories.
#[derive(Parser, Debug)]
#[command(name = "mediadl")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/mediadl/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed the download client from the queue until stopped
    Watch(WatchArgs),
    /// Show downloading, completed and queued items
    Status(StatusArgs),
    /// Reset error files / resources to queued
    Reset(ResetArgs),
    /// Queue resources (or files with --file) for the watch loop
    Enqueue(EnqueueArgs),
    /// Submit resources or files to a client right away
    Add(AddArgs),
    /// Inspect and control client tasks
    Client(ClientArgs),
    /// Run the transform pipeline over downloaded directories
    Normalize(NormalizeArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Log what would change without touching the queue or the client
    #[arg(long)]
    pub dry_run: bool,

    /// Exit once nothing is queued or downloading
    #[arg(long)]
    pub stop: bool,

    /// Client to feed
    #[arg(long, default_value = LOCAL_CLIENT)]
    pub client: String,

    /// Maximum concurrent downloads in the client (1-100)
    #[arg(long, default_value_t = DEFAULT_MAX_DOWNLOADS as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub max_downloads: u8,

    /// Seconds between cycles (1-3600)
    #[arg(long, default_value_t = DEFAULT_INTERVAL.as_secs(), value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub interval: u64,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = LOCAL_CLIENT)]
    pub client: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    /// Re-fetch error resources from their site and replace their rows
    #[arg(long)]
    pub readd: bool,

    /// Only reset items whose filename / folder name contains TEXT
    #[arg(long, value_name = "TEXT")]
    pub filter: Option<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EnqueueArgs {
    /// Resource identifiers (file identifiers with --file)
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Treat the ids as standalone file identifiers
    #[arg(long)]
    pub file: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// File or resource identifiers
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    #[arg(long, default_value = LOCAL_CLIENT)]
    pub client: String,

    /// Save path on the client (default: the client's save path)
    #[arg(long)]
    pub save_path: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    #[arg(long, default_value = LOCAL_CLIENT, global = true)]
    pub client: String,

    #[command(subcommand)]
    pub action: ClientAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ClientAction {
    /// List every task
    List,
    /// Show global client statistics
    Status,
    /// Pause tasks
    Pause {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Resume tasks
    Resume {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete tasks
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NormalizeArgs {
    /// Content directories (default: the current directory)
    #[arg(value_name = "DIR", conflicts_with = "save_path")]
    pub dirs: Vec<PathBuf>,

    /// Process every non-hidden subdirectory of this path
    #[arg(long)]
    pub save_path: Option<PathBuf>,

    /// Also process recently modified directories
    #[arg(short, long)]
    pub all: bool,

    /// Do not convert wav to flac
    #[arg(long)]
    pub no_flac: bool,

    /// Rename each directory to `.tf.NAME` while processing
    #[arg(short, long)]
    pub lock: bool,

    /// Move successfully processed directories here
    #[arg(long)]
    pub move_to: Option<PathBuf>,

    /// Transformer option, e.g. "bom=1"
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Archive password (repeatable)
    #[arg(short, long = "password", value_name = "PASSWORD")]
    pub passwords: Vec<String>,

    /// Remove backup and scratch dirs instead of processing
    #[arg(long, conflicts_with = "restore")]
    pub clean: bool,

    /// Rename locked `.tf.NAME` directories back instead of processing
    #[arg(long)]
    pub restore: bool,

    /// Do not prompt for confirmation (with --clean)
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
}
