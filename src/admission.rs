//! Task admission: expand an identifier into client downloads.
//!
//! A file identifier becomes one download; a resource identifier becomes one
//! download per member file. Files already complete on the client's local
//! filesystem are returned as completed rows without reaching the client.

use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::client::{AddRequest, ClientError, ClientTask, DownloadClient, local_file_complete};
use crate::queue::{FileStatus, NewFileDownload};
use crate::registry::Registry;
use crate::site::{Identifier, SiteError, SiteFile};

/// Errors from [`add_download_task`].
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// The identifier or its site is unusable.
    #[error(transparent)]
    Site(#[from] SiteError),

    #[error("failed to get resource {id:?} files: {source}")]
    ResourceFiles {
        id: String,
        #[source]
        source: SiteError,
    },

    #[error("failed to get file {id:?} full info: {source}")]
    FileInfo {
        id: String,
        #[source]
        source: SiteError,
    },

    #[error("file {id:?} no url found")]
    NoUrl { id: String },

    #[error("failed to add task: {0}")]
    Add(#[source] ClientError),

    #[error("failed to get added task: {0}")]
    GetAdded(#[source] ClientError),
}

/// Submitted downloads and the queue rows describing them.
#[derive(Debug, Clone, Default)]
pub struct AdmissionResult {
    /// Post-submission client state of every task actually created.
    pub client_tasks: Vec<ClientTask>,
    /// One row per resolved file: `downloading` with its task id, or
    /// `completed` when the file already existed locally.
    pub rows: Vec<NewFileDownload>,
}

/// Resolves `identifier` through its site and submits every file to `client`.
///
/// `save_path` is the target directory on the client; empty means the
/// client's configured save path.
///
/// # Errors
///
/// Returns [`AdmissionError`] when the identifier cannot be resolved or the
/// client rejects a submission. Tasks created before the failure stay in
/// the client.
#[instrument(skip(registry, client), fields(client = %client.name()))]
pub async fn add_download_task(
    registry: &Registry,
    client: &dyn DownloadClient,
    identifier: &str,
    save_path: &str,
) -> Result<AdmissionResult, AdmissionError> {
    let parsed = Identifier::parse(identifier);
    let site_name = parsed.site()?;
    let site = registry.site(site_name)?;
    let client_name = client.name().to_string();

    let mut rows = Vec::new();
    if parsed.is_resource() {
        let files = site
            .get_resource_files(identifier)
            .await
            .map_err(|source| AdmissionError::ResourceFiles {
                id: identifier.to_string(),
                source,
            })?;
        for mut file in files {
            if file.url.is_empty() {
                file = site
                    .get_file(&file.id)
                    .await
                    .map_err(|source| AdmissionError::FileInfo {
                        id: file.id.clone(),
                        source,
                    })?;
            }
            if file.url.is_empty() {
                return Err(AdmissionError::NoUrl { id: file.id });
            }
            let mut row = new_row(&file, site_name, site.get_identifier(&file.id), save_path);
            row.client.clone_from(&client_name);
            row.resource_id = identifier.to_string();
            rows.push(row);
        }
    } else {
        let file = site
            .get_file(identifier)
            .await
            .map_err(|source| AdmissionError::FileInfo {
                id: identifier.to_string(),
                source,
            })?;
        if file.url.is_empty() {
            return Err(AdmissionError::NoUrl { id: file.id });
        }
        let mut row = new_row(&file, site_name, site.get_identifier(&file.id), save_path);
        row.client.clone_from(&client_name);
        rows.push(row);
    }

    let effective_save_path = if save_path.is_empty() {
        client.config().save_path.clone()
    } else {
        save_path.to_string()
    };
    let mut client_tasks = Vec::new();
    for row in &mut rows {
        if client.config().local && local_file_complete(&effective_save_path, &row.filename) {
            trace!(filename = %row.filename, "File exists (already downloaded before)");
            row.status = FileStatus::Completed;
            continue;
        }
        let request = AddRequest {
            url: row.file_url.clone(),
            filename: row.filename.clone(),
            save_path: row.save_path.clone(),
            paused: false,
        };
        let id = match client.add(&request).await {
            Ok(id) => id,
            Err(ClientError::FileExists { path }) => {
                trace!(path = %path, "File exists (already downloaded before)");
                row.status = FileStatus::Completed;
                continue;
            }
            Err(err) => return Err(AdmissionError::Add(err)),
        };
        let task = client.get(&id).await.map_err(AdmissionError::GetAdded)?;
        debug!(id = %id, filename = %row.filename, "Submitted download");
        client_tasks.push(task);
        row.download_id = id;
    }
    Ok(AdmissionResult { client_tasks, rows })
}

fn new_row(file: &SiteFile, site: &str, identifier: String, save_path: &str) -> NewFileDownload {
    NewFileDownload {
        file_id: file.id.clone(),
        identifier,
        site: site.to_string(),
        file_url: file.url.clone(),
        filename: file.name.clone(),
        save_path: save_path.to_string(),
        status: FileStatus::Downloading,
        ..NewFileDownload::default()
    }
}
