//! Enqueue command handler: add resources or files to the queue for the
//! watch loop, skipping identifiers already known.

use anyhow::{Result, bail};
use mediadl_core::queue::{NewFileDownload, NewResourceDownload};
use mediadl_core::site::Identifier;
use mediadl_core::{Config, EnqueueOutcome, FileStatus, Queue, Registry};

use super::{build_registry, open_queue};
use crate::cli::EnqueueArgs;

pub async fn run_enqueue_command(config: &Config, args: &EnqueueArgs) -> Result<()> {
    let registry = build_registry(config)?;
    let queue = open_queue(config).await?;
    let mut errors = 0;
    for id in &args.ids {
        let outcome = if args.file {
            enqueue_file(&registry, &queue, id).await
        } else {
            enqueue_resource(&registry, &queue, id).await
        };
        match outcome {
            Ok(EnqueueOutcome::Added(row)) => println!("✓ {id:?}: queued (#{row})"),
            Ok(EnqueueOutcome::Skipped(row)) => {
                println!("- {id:?}: already downloaded before (#{row})");
            }
            Err(err) => {
                println!("X {id:?}: {err:#}");
                errors += 1;
            }
        }
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}

async fn enqueue_resource(registry: &Registry, queue: &Queue, id: &str) -> Result<EnqueueOutcome> {
    let parsed = Identifier::parse(id);
    let site_name = parsed.site()?;
    if !parsed.is_resource() {
        bail!("not a resource identifier (use --file for files)");
    }
    let site = registry.site(site_name)?;
    let resource = site.get_resource(id).await?;
    let row = NewResourceDownload {
        resource_id: id.to_string(),
        identifier: site.get_identifier(id),
        site: site_name.to_string(),
        number: resource.number,
        title: resource.title,
        author: resource.author,
        size: resource.size,
        tags: resource.tags,
    };
    Ok(queue.enqueue_resource(&row).await?)
}

async fn enqueue_file(registry: &Registry, queue: &Queue, id: &str) -> Result<EnqueueOutcome> {
    let parsed = Identifier::parse(id);
    let site_name = parsed.site()?;
    if parsed.is_resource() {
        bail!("a resource identifier can not be queued as a file");
    }
    let site = registry.site(site_name)?;
    let file = site.get_file(id).await?;
    if file.url.is_empty() {
        bail!("file has no url");
    }
    let row = NewFileDownload {
        file_id: id.to_string(),
        identifier: site.get_identifier(id),
        site: site_name.to_string(),
        file_url: file.url,
        filename: file.name,
        status: FileStatus::Queued,
        ..NewFileDownload::default()
    };
    Ok(queue.enqueue_file(&row).await?)
}
