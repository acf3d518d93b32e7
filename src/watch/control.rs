//! Console control commands read from stdin while the watch loop runs.
//!
//! | Line      | Effect                                              |
//! |-----------|-----------------------------------------------------|
//! | `r HOST`  | drop the watched client's connections to `HOST`     |
//! | `p`       | print the queue snapshot to stderr                  |
//! | `reset`   | move every error file back to downloading           |

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WatchError;
use crate::client::DownloadClient;
use crate::queue::Queue;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `r HOST`
    ResetConnections(String),
    /// `p`
    PrintStatus,
    /// `reset`
    ForceErrorDownloading,
}

impl ControlCommand {
    /// Parses a trimmed console line; `None` for anything unrecognized.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line == "p" {
            return Some(Self::PrintStatus);
        }
        if line == "reset" {
            return Some(Self::ForceErrorDownloading);
        }
        let host = line.strip_prefix("r ")?.trim();
        if host.is_empty() {
            None
        } else {
            Some(Self::ResetConnections(host.to_string()))
        }
    }

    /// Applies the command and returns the text to show the operator.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] if the queue or the client call fails.
    pub async fn execute(
        &self,
        queue: &Queue,
        client: &dyn DownloadClient,
    ) -> Result<String, WatchError> {
        match self {
            Self::ResetConnections(host) => {
                let reset = client.reset_connections(host).await?;
                info!(host = %host, reset, "Reset client connections");
                Ok(if reset {
                    format!("Connections to {host} reset")
                } else {
                    format!("No connections to {host}")
                })
            }
            Self::PrintStatus => Ok(queue.snapshot(client.name()).await?.to_string()),
            Self::ForceErrorDownloading => {
                let count = queue.force_error_downloading().await?;
                info!(count, "Error files moved back to downloading");
                Ok(format!("{count} error file(s) set to downloading"))
            }
        }
    }
}

/// Reads commands from `reader` until EOF, a read error, or cancellation.
pub async fn listen<R>(
    reader: R,
    queue: Queue,
    client: Arc<dyn DownloadClient>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Control input closed");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Control input read failed");
                return;
            }
        };
        let Some(command) = ControlCommand::parse(&line) else {
            if !line.trim().is_empty() {
                debug!(line = %line.trim(), "Unknown control command");
            }
            continue;
        };
        match command.execute(&queue, client.as_ref()).await {
            Ok(output) => eprintln!("{output}"),
            Err(err) => warn!(error = %err, ?command, "Control command failed"),
        }
    }
}

/// Spawns [`listen`] on the process stdin.
#[must_use]
pub fn spawn_stdin_listener(
    queue: Queue,
    client: Arc<dyn DownloadClient>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        listen(BufReader::new(tokio::io::stdin()), queue, client, cancel).await;
    })
}
