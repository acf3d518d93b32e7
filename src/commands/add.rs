//! Add command handler: submit identifiers straight to a client.

use anyhow::{Context, Result, bail};
use mediadl_core::{Config, add_download_task};
use tracing::{error, info};

use super::{build_registry, open_queue};
use crate::cli::AddArgs;

pub async fn run_add_command(config: &Config, args: &AddArgs) -> Result<()> {
    let registry = build_registry(config)?;
    let client = registry
        .client(&args.client)
        .context("failed to create client")?;
    client
        .get_status()
        .await
        .context("failed to connect to client")?;
    let queue = open_queue(config).await?;
    let save_path = args
        .save_path
        .clone()
        .unwrap_or_else(|| client.config().save_path.clone());

    let mut errors = 0;
    for id in &args.ids {
        let result = match add_download_task(&registry, client.as_ref(), id, &save_path).await {
            Ok(result) => result,
            Err(err) => {
                error!(id = %id, error = %err, "Failed to add");
                errors += 1;
                continue;
            }
        };
        let mut tx = queue.begin().await?;
        for row in &result.rows {
            tx.insert_file(row).await?;
        }
        tx.commit().await?;
        info!(
            id = %id,
            tasks = result.client_tasks.len(),
            files = result.rows.len(),
            "Added to client"
        );
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}
