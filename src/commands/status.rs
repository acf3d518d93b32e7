use anyhow::{Context, Result};
use mediadl_core::Config;

use super::open_queue;
use crate::cli::StatusArgs;

pub async fn run_status_command(config: &Config, args: &StatusArgs) -> Result<()> {
    let queue = open_queue(config).await?;
    let snapshot = queue
        .snapshot(&args.client)
        .await
        .context("failed to read queue")?;
    print!("{snapshot}");
    Ok(())
}
