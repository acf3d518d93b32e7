//! Queue row types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::error::QueueError;
use crate::naming::{clean_basename, clean_basename_component};

/// Status of a file download row.
///
/// `Queued` is stored as the empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Waiting to be handed to a download client.
    #[default]
    Queued,
    /// Handed to a download client.
    Downloading,
    /// Reported complete by the client, or already present locally.
    Completed,
    /// Failed too many times; terminal until reset.
    Error,
}

impl FileStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `true` for statuses the watch loop never moves away from on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl std::str::FromStr for FileStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(QueueError::invalid_status(s)),
        }
    }
}

/// Status of a resource download row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Waiting to be expanded into file downloads.
    #[default]
    Queued,
    /// Member files handed to a download client.
    Downloading,
    /// Every member file completed.
    Completed,
    /// A member failed, or expansion failed too many times.
    Error,
    /// Excluded from downloading; only cleared explicitly.
    Skip,
}

impl ResourceStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "skip" => Ok(Self::Skip),
            _ => Err(QueueError::invalid_status(s)),
        }
    }
}

/// One file in flight or completed.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileDownload {
    /// Surrogate id.
    pub id: i64,
    /// Task id inside the download client; empty until admitted.
    pub download_id: String,
    /// Opaque file identifier (`site=...&...`).
    pub file_id: String,
    /// Stable identifier used for dedup.
    pub identifier: String,
    /// Site name.
    pub site: String,
    /// Resolved source URL.
    pub file_url: String,
    /// Target filename.
    pub filename: String,
    /// Target directory.
    pub save_path: String,
    /// Owning resource identifier; empty for standalone files.
    pub resource_id: String,
    /// Status as stored (parsed via `status()`).
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: String,
    /// Last error detail.
    pub note: String,
    /// Owning client name.
    pub client: String,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl FileDownload {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Queued` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> FileStatus {
        self.status_str.parse().unwrap_or_default()
    }

    /// `true` when the row does not belong to a resource.
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.resource_id.is_empty()
    }
}

/// A file row about to be inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewFileDownload {
    pub download_id: String,
    pub file_id: String,
    pub identifier: String,
    pub site: String,
    pub file_url: String,
    pub filename: String,
    pub save_path: String,
    pub resource_id: String,
    pub status: FileStatus,
    pub note: String,
    pub client: String,
}

/// A collection of files grouped under one discovered resource.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResourceDownload {
    /// Surrogate id.
    pub id: i64,
    /// Resource identifier (`site=...&type=resource&...`).
    pub resource_id: String,
    /// Stable identifier used for dedup.
    pub identifier: String,
    /// Site name.
    pub site: String,
    /// Status as stored (parsed via `status()`).
    #[sqlx(rename = "status")]
    #[serde(rename = "status")]
    pub status_str: String,
    /// Advertised total size in bytes (not guaranteed accurate).
    pub size: i64,
    /// Catalogue number.
    pub number: String,
    /// Title.
    pub title: String,
    /// Author / circle / label.
    pub author: String,
    /// Owning client name.
    pub client: String,
    /// Directory the member files are saved to.
    pub save_path: String,
    /// Last error detail.
    pub note: String,
    /// Persisted count of failed expansions.
    pub failed: i64,
    /// Tags as a JSON array.
    #[sqlx(rename = "tags")]
    #[serde(skip)]
    pub tags_json: String,
    /// When the row was created.
    pub created_at: String,
    /// When the row was last updated.
    pub updated_at: String,
}

impl ResourceDownload {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Queued` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> ResourceStatus {
        self.status_str.parse().unwrap_or_default()
    }

    /// Parses tags from the JSON array column.
    ///
    /// Returns an empty vector for invalid JSON.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags_json).unwrap_or_default()
    }

    /// Folder name for this resource: `[number][author]title`, cleaned.
    #[must_use]
    pub fn folder_name(&self) -> String {
        folder_name(&self.number, &self.author, &self.title)
    }
}

pub(crate) fn folder_name(number: &str, author: &str, title: &str) -> String {
    let author = clean_basename_component(author);
    let title = clean_basename_component(title);
    let mut name = format!("[{number}]");
    if !author.is_empty() {
        name.push_str(&format!("[{author}]"));
    }
    name.push_str(&title);
    clean_basename(&name)
}

/// A resource row about to be inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewResourceDownload {
    pub resource_id: String,
    pub identifier: String,
    pub site: String,
    pub number: String,
    pub title: String,
    pub author: String,
    pub size: i64,
    pub tags: Vec<String>,
}

impl NewResourceDownload {
    pub(crate) fn tags_json(&self) -> String {
        serde_json::to_string(&self.tags).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Partial update of a file row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub status: Option<FileStatus>,
    pub download_id: Option<String>,
    pub save_path: Option<String>,
    pub client: Option<String>,
    pub note: Option<String>,
}

impl FileUpdate {
    /// Update that only changes the status.
    #[must_use]
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Terminal error with a note.
    #[must_use]
    pub fn error(note: impl Into<String>) -> Self {
        Self {
            status: Some(FileStatus::Error),
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Partial update of a resource row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub status: Option<ResourceStatus>,
    pub save_path: Option<String>,
    pub client: Option<String>,
    pub note: Option<String>,
    pub failed: Option<i64>,
}

impl ResourceUpdate {
    /// Update that only changes the status.
    #[must_use]
    pub fn status(status: ResourceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Terminal error with a note.
    #[must_use]
    pub fn error(note: impl Into<String>) -> Self {
        Self {
            status: Some(ResourceStatus::Error),
            note: Some(note.into()),
            ..Self::default()
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Result of a deduplicating insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new row was inserted.
    Added(i64),
    /// A row with the same (site, identifier) already exists.
    Skipped(i64),
}
