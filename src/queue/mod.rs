//! Queue module: persisted file and resource download rows.
//!
//! The queue is the only state shared between the watch loop, the console
//! control listener and one-shot commands. Every write touching more than one
//! row goes through a [`QueueTx`] so readers never see half of a resource
//! replacement.
//!
//! # Overview
//!
//! - [`Queue`] - pooled access plus the composite operations
//! - [`QueueTx`] - the same row operations inside one transaction
//! - [`FileDownload`] / [`ResourceDownload`] - stored rows
//! - [`FileFilter`] / [`ResourceFilter`] - conditional finds
//! - [`QueueSnapshot`] - the five-bucket status view
//!
//! # Example
//!
//! ```ignore
//! use mediadl_core::queue::{FileFilter, FileStatus, Queue};
//! use mediadl_core::Database;
//!
//! let queue = Queue::new(Database::new_in_memory().await?);
//! let downloading = queue
//!     .find_files(&FileFilter::new().client("local").status(FileStatus::Downloading))
//!     .await?;
//! ```

mod error;
mod filter;
mod item;
mod ops;
mod snapshot;

pub use error::{QueueDbErrorKind, QueueError};
pub use filter::{FileFilter, ResourceFilter};
pub use item::{
    EnqueueOutcome, FileDownload, FileStatus, FileUpdate, NewFileDownload, NewResourceDownload,
    ResourceDownload, ResourceStatus, ResourceUpdate,
};
pub use snapshot::QueueSnapshot;

use sqlx::{Sqlite, Transaction};
use tracing::{instrument, warn};

use crate::db::Database;

/// Returns `Ok(())` if at least one row was affected; otherwise [`QueueError::ItemNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(QueueError::ItemNotFound(id))
    } else {
        Ok(())
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Rows touched by [`Queue::reset_errors`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetCounts {
    pub files: u64,
    pub resources: u64,
}

/// Queue manager for file and resource download rows.
#[derive(Debug, Clone)]
pub struct Queue {
    db: Database,
}

impl Queue {
    /// Creates a new queue manager with the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens a transaction. Dropping the returned value without
    /// [`QueueTx::commit`] rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if no connection is available.
    pub async fn begin(&self) -> Result<QueueTx> {
        Ok(QueueTx {
            tx: self.db.pool().begin().await?,
        })
    }

    /// Inserts a file row and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the insert fails.
    #[instrument(skip(self, row), fields(file_id = %row.file_id))]
    pub async fn insert_file(&self, row: &NewFileDownload) -> Result<i64> {
        let mut conn = self.db.pool().acquire().await?;
        ops::insert_file(&mut conn, row).await
    }

    /// Inserts a resource row (status queued) and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the insert fails.
    #[instrument(skip(self, row), fields(resource_id = %row.resource_id))]
    pub async fn insert_resource(&self, row: &NewResourceDownload) -> Result<i64> {
        let mut conn = self.db.pool().acquire().await?;
        ops::insert_resource(&mut conn, row).await
    }

    /// Inserts a standalone file unless a row with the same (site, identifier)
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if a query fails.
    #[instrument(skip(self, row), fields(file_id = %row.file_id))]
    pub async fn enqueue_file(&self, row: &NewFileDownload) -> Result<EnqueueOutcome> {
        let mut tx = self.begin().await?;
        if !row.identifier.is_empty() {
            let existing = tx
                .find_files(&FileFilter::new().identifier(&row.site, &row.identifier))
                .await?;
            if let Some(existing) = existing.first() {
                warn!(
                    identifier = %row.identifier,
                    existing_id = existing.id,
                    "File already downloaded before, skipping"
                );
                return Ok(EnqueueOutcome::Skipped(existing.id));
            }
        }
        let id = tx.insert_file(row).await?;
        tx.commit().await?;
        Ok(EnqueueOutcome::Added(id))
    }

    /// Inserts a resource unless a row with the same (site, identifier)
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if a query fails.
    #[instrument(skip(self, row), fields(resource_id = %row.resource_id))]
    pub async fn enqueue_resource(&self, row: &NewResourceDownload) -> Result<EnqueueOutcome> {
        let mut tx = self.begin().await?;
        let existing = ops::find_resources(
            &mut tx.tx,
            &ResourceFilter::new().identifier(&row.site, &row.identifier),
            Some(1),
        )
        .await?;
        if let Some(existing) = existing.first() {
            warn!(
                identifier = %row.identifier,
                existing_id = existing.id,
                "Resource already downloaded before, skipping"
            );
            return Ok(EnqueueOutcome::Skipped(existing.id));
        }
        let id = ops::insert_resource(&mut tx.tx, row).await?;
        tx.commit().await?;
        Ok(EnqueueOutcome::Added(id))
    }

    /// Fetches one file row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    #[instrument(skip(self))]
    pub async fn get_file(&self, id: i64) -> Result<FileDownload> {
        let mut conn = self.db.pool().acquire().await?;
        ops::get_file(&mut conn, id).await
    }

    /// Fetches one resource row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    #[instrument(skip(self))]
    pub async fn get_resource(&self, id: i64) -> Result<ResourceDownload> {
        let mut conn = self.db.pool().acquire().await?;
        ops::get_resource(&mut conn, id).await
    }

    /// File rows matching `filter`, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_files(&self, filter: &FileFilter) -> Result<Vec<FileDownload>> {
        let mut conn = self.db.pool().acquire().await?;
        ops::find_files(&mut conn, filter, None).await
    }

    /// Resource rows matching `filter`, fewest failures first, then most
    /// recently updated.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_resources(&self, filter: &ResourceFilter) -> Result<Vec<ResourceDownload>> {
        let mut conn = self.db.pool().acquire().await?;
        ops::find_resources(&mut conn, filter, None).await
    }

    /// The most recently updated queued standalone file.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn next_queued_file(&self) -> Result<Option<FileDownload>> {
        let mut conn = self.db.pool().acquire().await?;
        let filter = FileFilter::new().status(FileStatus::Queued).standalone();
        Ok(ops::find_files(&mut conn, &filter, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// The next queued resource: fewest prior failures, then most recently updated.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn next_queued_resource(&self) -> Result<Option<ResourceDownload>> {
        let mut conn = self.db.pool().acquire().await?;
        let filter = ResourceFilter::new().status(ResourceStatus::Queued);
        Ok(ops::find_resources(&mut conn, &filter, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// Applies a partial update to one file row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    #[instrument(skip(self))]
    pub async fn update_file(&self, id: i64, update: &FileUpdate) -> Result<()> {
        let mut conn = self.db.pool().acquire().await?;
        ops::update_file(&mut conn, id, update).await
    }

    /// Applies a partial update to one resource row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    #[instrument(skip(self))]
    pub async fn update_resource(&self, id: i64, update: &ResourceUpdate) -> Result<()> {
        let mut conn = self.db.pool().acquire().await?;
        ops::update_resource(&mut conn, id, update).await
    }

    /// Deletes file rows by id; returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_files(&self, ids: &[i64]) -> Result<u64> {
        let mut conn = self.db.pool().acquire().await?;
        ops::delete_files(&mut conn, ids).await
    }

    /// `true` while any resource or file is queued or downloading.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn has_pending(&self) -> Result<bool> {
        let mut conn = self.db.pool().acquire().await?;
        let resources = ops::count_resources(
            &mut conn,
            &ResourceFilter::new()
                .status(ResourceStatus::Queued)
                .status(ResourceStatus::Downloading),
        )
        .await?;
        if resources > 0 {
            return Ok(true);
        }
        let files = ops::count_files(
            &mut conn,
            &FileFilter::new()
                .status(FileStatus::Queued)
                .status(FileStatus::Downloading),
        )
        .await?;
        Ok(files > 0)
    }

    /// Requeues every error file and error resource (clearing the resource
    /// failure count) in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if an update fails.
    #[instrument(skip(self))]
    pub async fn reset_errors(&self) -> Result<ResetCounts> {
        let mut tx = self.begin().await?;
        let files =
            ops::set_file_status_where(&mut tx.tx, FileStatus::Error, FileStatus::Queued).await?;
        let resources = ops::requeue_error_resources(&mut tx.tx).await?;
        tx.commit().await?;
        Ok(ResetCounts { files, resources })
    }

    /// Requeues error files only; error resources are left for
    /// [`Queue::replace_resource`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reset_error_files(&self) -> Result<u64> {
        let mut conn = self.db.pool().acquire().await?;
        ops::set_file_status_where(&mut conn, FileStatus::Error, FileStatus::Queued).await
    }

    /// Moves every error file back to downloading so the next lost-task pass
    /// re-submits it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn force_error_downloading(&self) -> Result<u64> {
        let mut conn = self.db.pool().acquire().await?;
        ops::set_file_status_where(&mut conn, FileStatus::Error, FileStatus::Downloading).await
    }

    /// Atomically replaces `old` (and all of its file rows) with a fresh
    /// queued resource. Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if `old` no longer exists, or
    /// [`QueueError::Database`] if a statement fails. Nothing is changed on error.
    #[instrument(skip(self, old, new), fields(old_id = old.id))]
    pub async fn replace_resource(
        &self,
        old: &ResourceDownload,
        new: &NewResourceDownload,
    ) -> Result<i64> {
        let mut tx = self.begin().await?;
        ops::delete_resource(&mut tx.tx, old.id).await?;
        ops::delete_files_of_resource(&mut tx.tx, &old.resource_id).await?;
        let id = ops::insert_resource(&mut tx.tx, new).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Builds the five-bucket status view for `client`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, client: &str) -> Result<QueueSnapshot> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(QueueSnapshot {
            downloading_files: ops::find_files(
                &mut conn,
                &FileFilter::new()
                    .client(client)
                    .status(FileStatus::Downloading),
                None,
            )
            .await?,
            completed_resources: ops::find_resources(
                &mut conn,
                &ResourceFilter::new()
                    .client(client)
                    .status(ResourceStatus::Completed),
                None,
            )
            .await?,
            completed_files: ops::find_files(
                &mut conn,
                &FileFilter::new()
                    .client(client)
                    .status(FileStatus::Completed)
                    .standalone(),
                None,
            )
            .await?,
            queued_resources: ops::find_resources(
                &mut conn,
                &ResourceFilter::new().status(ResourceStatus::Queued),
                None,
            )
            .await?,
            queued_files: ops::find_files(
                &mut conn,
                &FileFilter::new().status(FileStatus::Queued).standalone(),
                None,
            )
            .await?,
        })
    }
}

/// Row operations inside one open transaction.
#[derive(Debug)]
pub struct QueueTx {
    tx: Transaction<'static, Sqlite>,
}

impl QueueTx {
    /// Commits every write made through this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the commit fails.
    pub async fn commit(self) -> Result<()> {
        Ok(self.tx.commit().await?)
    }

    /// Discards every write made through this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the rollback fails.
    pub async fn rollback(self) -> Result<()> {
        Ok(self.tx.rollback().await?)
    }

    /// See [`Queue::get_file`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    pub async fn get_file(&mut self, id: i64) -> Result<FileDownload> {
        ops::get_file(&mut self.tx, id).await
    }

    /// See [`Queue::find_files`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    pub async fn find_files(&mut self, filter: &FileFilter) -> Result<Vec<FileDownload>> {
        ops::find_files(&mut self.tx, filter, None).await
    }

    /// The file row tracking client task `download_id` of `client`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the query fails.
    pub async fn find_file_by_task(
        &mut self,
        client: &str,
        download_id: &str,
    ) -> Result<Option<FileDownload>> {
        let filter = FileFilter::new().client(client).download_id(download_id);
        Ok(ops::find_files(&mut self.tx, &filter, Some(1))
            .await?
            .into_iter()
            .next())
    }

    /// See [`Queue::insert_file`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the insert fails.
    pub async fn insert_file(&mut self, row: &NewFileDownload) -> Result<i64> {
        ops::insert_file(&mut self.tx, row).await
    }

    /// See [`Queue::update_file`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    pub async fn update_file(&mut self, id: i64, update: &FileUpdate) -> Result<()> {
        ops::update_file(&mut self.tx, id, update).await
    }

    /// See [`Queue::update_resource`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ItemNotFound`] if no row has this id.
    pub async fn update_resource(&mut self, id: i64, update: &ResourceUpdate) -> Result<()> {
        ops::update_resource(&mut self.tx, id, update).await
    }

    /// See [`Queue::delete_files`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Database`] if the delete fails.
    pub async fn delete_files(&mut self, ids: &[i64]) -> Result<u64> {
        ops::delete_files(&mut self.tx, ids).await
    }
}
