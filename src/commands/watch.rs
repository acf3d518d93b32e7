//! Watch command handler: run the reconciliation loop for one client.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mediadl_core::watch::control;
use mediadl_core::{Config, WatchExit, WatchLoop, WatchOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{build_registry, open_queue};
use crate::cli::WatchArgs;

pub async fn run_watch_command(config: &Config, args: &WatchArgs) -> Result<()> {
    let registry = build_registry(config)?;
    let queue = open_queue(config).await?;
    let client = registry
        .client(&args.client)
        .context("failed to create client")?;

    let options = WatchOptions {
        dry_run: args.dry_run,
        stop_when_idle: args.stop,
        max_downloads: usize::from(args.max_downloads),
        interval: Duration::from_secs(args.interval),
        ..WatchOptions::default()
    };

    let cancel = CancellationToken::new();
    let listener = if io::stdin().is_terminal() {
        Some(control::spawn_stdin_listener(
            queue.clone(),
            Arc::clone(&client),
            cancel.clone(),
        ))
    } else {
        debug!("stdin is not a terminal, console commands disabled");
        None
    };
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping watch loop");
                cancel.cancel();
            }
        })
    };

    let mut watch = WatchLoop::new(queue, client, Arc::new(registry), options);
    let exit = watch.run(cancel.clone()).await;
    cancel.cancel();
    interrupt.abort();
    if let Some(listener) = listener {
        listener.abort();
    }

    match exit {
        WatchExit::Idle => info!("No pending downloads left, exit"),
        WatchExit::Cancelled => info!("Watch loop cancelled"),
    }
    Ok(())
}
