//! Reset command handler: requeue error files and resources.

use anyhow::{Context, Result, bail};
use mediadl_core::queue::{
    FileFilter, FileUpdate, NewResourceDownload, ResourceFilter, ResourceUpdate,
};
use mediadl_core::{Config, FileStatus, Queue, Registry, ResourceDownload, ResourceStatus};

use super::{build_registry, confirm, open_queue};
use crate::cli::ResetArgs;

pub async fn run_reset_command(config: &Config, args: &ResetArgs) -> Result<()> {
    let queue = open_queue(config).await?;
    let mut files = queue
        .find_files(&FileFilter::new().status(FileStatus::Error))
        .await?;
    let mut resources = queue
        .find_resources(&ResourceFilter::new().status(ResourceStatus::Error))
        .await?;
    if let Some(filter) = args.filter.as_deref() {
        files.retain(|file| file.filename.contains(filter));
        resources.retain(|resource| resource.folder_name().contains(filter));
    }
    if files.is_empty() && resources.is_empty() {
        println!("No matched downloads / resource_downloads");
        return Ok(());
    }

    if !args.force {
        println!("Error file downloads:");
        for file in &files {
            println!("  {}  {}", file.filename, file.note);
        }
        println!("Error resource downloads:");
        for resource in &resources {
            println!("  {}  {}", resource.folder_name(), resource.note);
        }
        let prompt = format!(
            "Reset above {} download / {} resource tasks",
            files.len(),
            resources.len()
        );
        if !confirm(&prompt)? {
            bail!("abort");
        }
    }

    for file in &files {
        queue
            .update_file(file.id, &FileUpdate::status(FileStatus::Queued))
            .await?;
    }
    if !args.readd {
        for resource in &resources {
            queue
                .update_resource(
                    resource.id,
                    &ResourceUpdate {
                        failed: Some(0),
                        ..ResourceUpdate::status(ResourceStatus::Queued)
                    },
                )
                .await?;
        }
        println!(
            "Resetted error tasks: {} file downloads, {} resource downloads",
            files.len(),
            resources.len()
        );
        return Ok(());
    }

    println!("Resetted error tasks: {} file downloads", files.len());
    println!("Re-adding resource downloads");
    let registry = build_registry(config)?;
    let mut errors = 0;
    for resource in &resources {
        match readd_resource(&registry, &queue, resource).await {
            Ok(identifier) => println!("Re-added {identifier:?} resource"),
            Err(err) => {
                println!("X {:?}: failed to readd: {err:#}", resource.identifier);
                errors += 1;
            }
        }
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}

/// Fetches `old` again from its site and swaps it for a fresh queued row.
async fn readd_resource(
    registry: &Registry,
    queue: &Queue,
    old: &ResourceDownload,
) -> Result<String> {
    let site = registry.site(&old.site)?;
    let fresh = site
        .get_resource(&old.resource_id)
        .await
        .context("resource no longer available on site")?;
    let resource_id = if fresh.id.is_empty() {
        old.resource_id.clone()
    } else {
        fresh.id
    };
    let identifier = site.get_identifier(&resource_id);
    let replacement = NewResourceDownload {
        identifier: identifier.clone(),
        site: old.site.clone(),
        number: fresh.number,
        title: fresh.title,
        author: fresh.author,
        size: fresh.size,
        tags: fresh.tags,
        resource_id,
    };
    queue.replace_resource(old, &replacement).await?;
    Ok(identifier)
}
