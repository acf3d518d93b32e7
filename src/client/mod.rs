//! Download client abstraction.
//!
//! A [`DownloadClient`] is an external transfer engine that owns the actual
//! bytes on the wire. The watch loop and the admission helper only ever talk
//! to it through this trait, so tests can substitute an in-memory client.
//!
//! # Overview
//!
//! - [`DownloadClient`] - async capability trait
//! - [`ClientTask`] / [`TaskStatus`] - one task as the client reports it
//! - [`AddRequest`] - what to download, and where
//! - [`Aria2Client`] - aria2 JSON-RPC implementation

mod aria2;
mod error;

pub use aria2::Aria2Client;
pub use error::ClientError;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::naming::path_exists;

/// Suffix of aria2's partial-download control file.
pub const ARIA2_CONTROL_SUFFIX: &str = ".aria2";

/// Status of a task as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Downloading,
    Paused,
    Completed,
    Error,
    Deleted,
    Unknown,
}

impl TaskStatus {
    /// Returns the display string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One task known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientTask {
    /// Task id inside the client.
    pub id: String,
    pub filename: String,
    /// Total size in bytes; 0 when unknown.
    pub size: i64,
    pub save_path: String,
    pub status: TaskStatus,
    /// Diagnostic message, empty unless the client reported an error.
    pub msg: String,
}

/// Tasks keyed by id.
pub type ClientTasks = BTreeMap<String, ClientTask>;

/// A new download handed to [`DownloadClient::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddRequest {
    pub url: String,
    /// Target filename inside `save_path`; empty lets the client choose.
    pub filename: String,
    /// Target directory; empty means the client's configured save path.
    pub save_path: String,
    /// Create the task paused.
    pub paused: bool,
}

/// Global transfer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// Bytes per second.
    pub download_speed: i64,
    /// Bytes per second.
    pub upload_speed: i64,
}

/// Capability interface of a download backend.
///
/// There is no way to resume a task in error state; the only remedy is to
/// create a new task.
#[async_trait]
pub trait DownloadClient: Send + Sync + fmt::Debug {
    /// Client name as configured.
    fn name(&self) -> &str;

    /// Client configuration.
    fn config(&self) -> &ClientConfig;

    /// Path separator on the client's filesystem.
    fn sep(&self) -> char {
        if self.config().windows { '\\' } else { '/' }
    }

    /// Joins `name` onto `dir` using the client's separator.
    fn join_path(&self, dir: &str, name: &str) -> String {
        let sep = self.sep();
        if dir.is_empty() {
            name.to_string()
        } else if dir.ends_with(sep) {
            format!("{dir}{name}")
        } else {
            format!("{dir}{sep}{name}")
        }
    }

    /// Global transfer statistics.
    async fn get_status(&self) -> Result<ClientStatus, ClientError>;

    /// Submits a download and returns the new task id.
    ///
    /// Returns [`ClientError::FileExists`] when the target already exists
    /// locally and no partial-download marker is present.
    async fn add(&self, request: &AddRequest) -> Result<String, ClientError>;

    /// Fetches one task.
    async fn get(&self, id: &str) -> Result<ClientTask, ClientError>;

    /// Removes a task and its stored result.
    async fn delete(&self, id: &str) -> Result<(), ClientError>;

    async fn pause(&self, id: &str) -> Result<(), ClientError>;

    async fn resume(&self, id: &str) -> Result<(), ClientError>;

    /// Every task the client knows about, except removed ones.
    async fn get_all(&self) -> Result<ClientTasks, ClientError>;

    /// Drops pooled connections to `host`. Returns `true` if anything was reset.
    async fn reset_connections(&self, _host: &str) -> Result<bool, ClientError> {
        Ok(false)
    }
}

/// `true` when `save_path/filename` exists and has no `.aria2` control file
/// next to it, i.e. a previous download of the same file finished.
#[must_use]
pub fn local_file_complete(save_path: &str, filename: &str) -> bool {
    if filename.is_empty() {
        return false;
    }
    let path = Path::new(save_path).join(filename);
    let mut marker = path.clone().into_os_string();
    marker.push(ARIA2_CONTROL_SUFFIX);
    path_exists(&path) && !path_exists(Path::new(&marker))
}
