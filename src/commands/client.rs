//! Client command handlers: list, inspect and control client tasks.

use anyhow::{Context, Result, bail};
use mediadl_core::Config;
use mediadl_core::client::DownloadClient;
use std::sync::Arc;

use super::build_registry;
use crate::cli::ClientAction;

fn client(config: &Config, name: &str) -> Result<Arc<dyn DownloadClient>> {
    build_registry(config)?
        .client(name)
        .context("failed to create client")
}

pub async fn run_client_list_command(config: &Config, name: &str) -> Result<()> {
    let client = client(config, name)?;
    let tasks = client.get_all().await.context("failed to get client tasks")?;
    println!("{:<18}  {:<11}  {:>12}  Name", "Id", "Status", "Size");
    for task in tasks.values() {
        println!(
            "{:<18}  {:<11}  {:>12}  {}",
            task.id,
            task.status.as_str(),
            task.size,
            task.filename
        );
        if !task.msg.is_empty() {
            println!("{:<18}  {}", "", task.msg);
        }
    }
    println!("\n{} tasks", tasks.len());
    Ok(())
}

pub async fn run_client_status_command(config: &Config, name: &str) -> Result<()> {
    let client = client(config, name)?;
    let status = client.get_status().await.context("failed to get client status")?;
    println!("client = {}", client.name());
    println!("download_speed = {}", status.download_speed);
    println!("upload_speed = {}", status.upload_speed);
    Ok(())
}

/// Pauses, resumes or deletes each task, reporting one line per id.
pub async fn run_client_task_command(
    config: &Config,
    name: &str,
    action: &ClientAction,
    ids: &[String],
) -> Result<()> {
    let client = client(config, name)?;
    let mut errors = 0;
    for id in ids {
        let result = match action {
            ClientAction::Pause { .. } => client.pause(id).await,
            ClientAction::Resume { .. } => client.resume(id).await,
            ClientAction::Delete { .. } => client.delete(id).await,
            ClientAction::List | ClientAction::Status => return Ok(()),
        };
        match result {
            Ok(()) => println!("✓ {id}"),
            Err(err) => {
                println!("X {id}: {err}");
                errors += 1;
            }
        }
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}
