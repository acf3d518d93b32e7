//! Watch loop: keeps one download client in step with the queue.
//!
//! Each cycle polls the client, writes finished and failed tasks back into
//! the queue, re-submits tasks the client lost, derives resource status from
//! the resource's files, and finally admits at most one queued file and one
//! queued resource while fewer than `max_downloads` tasks are active.
//!
//! # Overview
//!
//! - [`WatchLoop`] - the scheduler; [`WatchLoop::run_cycle`] runs one pass
//! - [`WatchOptions`] - limits and timings
//! - [`CycleOutcome`] - what a pass decided to do next
//! - [`control`] - stdin commands served alongside the loop
//!
//! Client connectivity failures back off exponentially and are retried
//! forever. Submission failures are counted per file or resource id; at the
//! threshold the row becomes `error` with the last error in its note.

mod backoff;
pub mod control;
mod failures;

pub use backoff::{
    Backoff, DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_JITTER, with_jitter,
};
pub use failures::{DEFAULT_FAILURE_THRESHOLD, FailureCounter};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::admission::{AdmissionError, AdmissionResult, add_download_task};
use crate::client::{ClientError, ClientTask, DownloadClient, TaskStatus};
use crate::queue::{
    FileDownload, FileFilter, FileStatus, FileUpdate, Queue, QueueError, QueueTx,
    ResourceDownload, ResourceFilter, ResourceStatus, ResourceUpdate,
};
use crate::registry::Registry;

/// Default bound on concurrently downloading tasks.
pub const DEFAULT_MAX_DOWNLOADS: usize = 4;

/// Default sleep between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(32);

/// Errors surfaced by one watch cycle or control command.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Admission succeeded but produced no row for `id`.
    #[error("no download created for {id:?}")]
    NothingAdmitted { id: String },
}

impl WatchError {
    /// True when the cycle failed on a locked queue or an unreachable client.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Queue(err) => err.is_retryable(),
            Self::Client(err) => err.is_transient(),
            Self::Admission(_) | Self::NothingAdmitted { .. } => false,
        }
    }
}

/// Limits and timings of the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    /// Log what would change without writing the queue or touching tasks.
    pub dry_run: bool,
    /// Return once nothing is queued or downloading and a cycle had no errors.
    pub stop_when_idle: bool,
    pub max_downloads: usize,
    pub interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Consecutive failures after which a file or resource becomes `error`.
    pub failure_threshold: u32,
    /// Upper bound of the random jitter added to every sleep.
    pub max_jitter: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stop_when_idle: false,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            interval: DEFAULT_INTERVAL,
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

/// How a cycle ended and what the loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Listing the client failed; sleep the backoff delay.
    ClientUnavailable(Duration),
    /// `max_downloads` tasks are active; sleep the interval.
    Saturated,
    /// Submitting a queued file or resource failed; sleep the backoff delay.
    AdmissionFailed(Duration),
    /// Stop mode and nothing left to do.
    Idle,
    /// Every step ran; sleep the interval.
    Completed,
}

/// Why [`WatchLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    Idle,
    Cancelled,
}

/// The reconciliation scheduler for one client.
#[derive(Debug)]
pub struct WatchLoop {
    queue: Queue,
    client: Arc<dyn DownloadClient>,
    registry: Arc<Registry>,
    options: WatchOptions,
    failures: FailureCounter,
    client_backoff: Backoff,
    admission_backoff: Backoff,
}

impl WatchLoop {
    #[must_use]
    pub fn new(
        queue: Queue,
        client: Arc<dyn DownloadClient>,
        registry: Arc<Registry>,
        options: WatchOptions,
    ) -> Self {
        let backoff = Backoff::new(options.backoff_initial, options.backoff_max);
        Self {
            queue,
            client,
            registry,
            failures: FailureCounter::new(options.failure_threshold),
            client_backoff: backoff.clone(),
            admission_backoff: backoff,
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// In-memory failure count of a file id or resource id.
    #[must_use]
    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.count(key)
    }

    /// Runs cycles until stop mode goes idle or `cancel` fires.
    ///
    /// Cycle errors are logged and followed by a regular interval sleep.
    pub async fn run(&mut self, cancel: CancellationToken) -> WatchExit {
        info!(
            client = %self.client.name(),
            max_downloads = self.options.max_downloads,
            dry_run = self.options.dry_run,
            "Watch loop started"
        );
        loop {
            let outcome = tokio::select! {
                () = cancel.cancelled() => return WatchExit::Cancelled,
                outcome = self.run_cycle() => outcome,
            };
            let (delay, tip) = match outcome {
                Ok(CycleOutcome::Idle) => return WatchExit::Idle,
                Ok(CycleOutcome::ClientUnavailable(delay)) => (delay, "get client tasks failed"),
                Ok(CycleOutcome::AdmissionFailed(delay)) => {
                    (delay, "add new download to client failed")
                }
                Ok(CycleOutcome::Saturated) => (self.options.interval, "enough incoming downloads"),
                Ok(CycleOutcome::Completed) => (self.options.interval, "All processes finished"),
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "Watch cycle interrupted");
                    (self.options.interval, "cycle failed")
                }
                Err(err) => {
                    error!(error = %err, "Watch cycle failed");
                    (self.options.interval, "cycle failed")
                }
            };
            warn!("Sleep {}s ({tip})", delay.as_secs());
            let delay = with_jitter(delay, self.options.max_jitter);
            tokio::select! {
                () = cancel.cancelled() => return WatchExit::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs one reconciliation pass without sleeping.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] when a queue read needed to decide the next
    /// step fails. Per-task failures are counted, not returned.
    #[instrument(skip(self), fields(client = %self.client.name()))]
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, WatchError> {
        let tasks = match self.client.get_all().await {
            Ok(tasks) => {
                self.client_backoff.reset();
                tasks
            }
            Err(err) => return Ok(self.client_unavailable(&err)),
        };

        let mut downloading = 0usize;
        let mut errors = 0usize;
        for task in tasks.values() {
            if task.status == TaskStatus::Downloading {
                downloading += 1;
                continue;
            }
            match self.reconcile_task(task).await {
                Ok(true) => downloading += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(filename = %task.filename, error = %err, "Failed to update client download");
                    errors += 1;
                }
            }
        }

        let live = match self.client.get_all().await {
            Ok(tasks) => tasks,
            Err(err) => return Ok(self.client_unavailable(&err)),
        };
        let filter = FileFilter::new()
            .client(self.client.name())
            .status(FileStatus::Downloading);
        match self.queue.find_files(&filter).await {
            Ok(rows) => {
                for row in rows {
                    if !row.download_id.is_empty() && live.contains_key(&row.download_id) {
                        continue;
                    }
                    eprintln!("Re-create lost download task {}", row.filename);
                    if self.options.dry_run {
                        continue;
                    }
                    match self.recover_lost(&row).await {
                        Ok(true) => downloading += 1,
                        Ok(false) => {}
                        Err(err) => {
                            error!(filename = %row.filename, error = %err, "Failed to update lost download");
                        }
                    }
                }
            }
            Err(err) => error!(error = %err, "Failed to find lost downloads"),
        }

        let filter = ResourceFilter::new()
            .client(self.client.name())
            .status(ResourceStatus::Downloading);
        match self.queue.find_resources(&filter).await {
            Ok(resources) => {
                for resource in &resources {
                    if let Err(err) = self.reconcile_resource(resource).await {
                        error!(resource_id = %resource.resource_id, error = %err, "Failed to update resource status");
                        errors += 1;
                    }
                }
            }
            Err(err) => error!(error = %err, "Failed to get downloading resources"),
        }

        if self.options.stop_when_idle && errors == 0 && !self.queue.has_pending().await? {
            eprintln!("All resources download completed");
            return Ok(CycleOutcome::Idle);
        }

        if downloading >= self.options.max_downloads {
            debug!(downloading, "Admission gate closed");
            return Ok(CycleOutcome::Saturated);
        }

        if let Some(delay) = self.admit_file().await? {
            return Ok(CycleOutcome::AdmissionFailed(delay));
        }
        if let Some(delay) = self.admit_resource().await? {
            return Ok(CycleOutcome::AdmissionFailed(delay));
        }
        Ok(CycleOutcome::Completed)
    }

    fn client_unavailable(&mut self, err: &ClientError) -> CycleOutcome {
        let delay = self.client_backoff.fail();
        error!(error = %err, delay_secs = delay.as_secs(), "Failed to get client tasks");
        CycleOutcome::ClientUnavailable(delay)
    }

    /// Writes one non-downloading client task back into its file row.
    /// Returns `true` when the task was re-created and is downloading again.
    async fn reconcile_task(&mut self, task: &ClientTask) -> Result<bool, WatchError> {
        let mut tx = self.queue.begin().await?;
        let Some(row) = tx.find_file_by_task(self.client.name(), &task.id).await? else {
            return Ok(false);
        };
        if matches!(row.status(), FileStatus::Error | FileStatus::Completed) {
            return Ok(false);
        }

        match task.status {
            TaskStatus::Error => {
                let reason = format!("task {} download error: {}", task.id, task.msg);
                if self.record_file_failure(&mut tx, &row, &reason).await? {
                    if self.options.dry_run {
                        return Ok(false);
                    }
                    tx.commit().await?;
                    self.delete_task(&task.id).await;
                    return Ok(false);
                }
                debug!(
                    filename = %row.filename,
                    file_id = %row.file_id,
                    failed = self.failures.count(&row.file_id),
                    "Re-creating error download task"
                );
                if self.options.dry_run {
                    return Ok(false);
                }
                let result = match add_download_task(
                    &self.registry,
                    self.client.as_ref(),
                    &row.file_id,
                    &task.save_path,
                )
                .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        self.record_file_failure(&mut tx, &row, &err.to_string())
                            .await?;
                        tx.commit().await?;
                        return Err(err.into());
                    }
                };
                let created = first_row(&row.file_id, &result)?;
                tx.update_file(
                    row.id,
                    &FileUpdate {
                        status: Some(created.status),
                        download_id: Some(created.download_id.clone()),
                        save_path: Some(created.save_path.clone()),
                        client: Some(created.client.clone()),
                        note: Some(String::new()),
                    },
                )
                .await?;
                tx.commit().await?;
                trace!(filename = %row.filename, new_download_id = %created.download_id, "Re-created error download");
                self.delete_task(&task.id).await;
                Ok(true)
            }
            TaskStatus::Completed => {
                if self.options.dry_run {
                    return Ok(false);
                }
                self.failures.clear(&row.file_id);
                tx.update_file(row.id, &FileUpdate::status(FileStatus::Completed))
                    .await?;
                tx.commit().await?;
                info!(filename = %row.filename, download_id = %task.id, "File download completed");
                self.delete_task(&task.id).await;
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Re-submits a downloading row whose client task disappeared.
    async fn recover_lost(&mut self, row: &FileDownload) -> Result<bool, WatchError> {
        let result = add_download_task(
            &self.registry,
            self.client.as_ref(),
            &row.file_id,
            &row.save_path,
        )
        .await;
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                let mut tx = self.queue.begin().await?;
                self.record_file_failure(&mut tx, row, &err.to_string())
                    .await?;
                tx.commit().await?;
                return Ok(false);
            }
        };
        let created = first_row(&row.file_id, &result)?;
        self.queue
            .update_file(
                row.id,
                &FileUpdate {
                    status: Some(created.status),
                    download_id: Some(created.download_id.clone()),
                    ..FileUpdate::default()
                },
            )
            .await?;
        info!(filename = %row.filename, download_id = %created.download_id, "Recovered lost download");
        Ok(created.status == FileStatus::Downloading)
    }

    /// Derives a downloading resource's status from its files.
    async fn reconcile_resource(&mut self, resource: &ResourceDownload) -> Result<(), WatchError> {
        let mut tx = self.queue.begin().await?;
        let children = tx
            .find_files(
                &FileFilter::new()
                    .client(self.client.name())
                    .resource(&resource.resource_id),
            )
            .await?;

        let mut note = String::new();
        let mut is_error = false;
        let mut is_complete = false;
        if children.is_empty() {
            note.push_str("No file downloads task");
            is_error = true;
        } else {
            is_complete = true;
            for child in &children {
                match child.status() {
                    FileStatus::Completed => {}
                    FileStatus::Error => {
                        is_error = true;
                        is_complete = false;
                        note.push_str(&format!(
                            "file {} ({}) download error ({}); ",
                            child.filename, child.download_id, child.note
                        ));
                    }
                    _ => is_complete = false,
                }
            }
        }

        if is_error {
            eprintln!("Resource {} download error", resource.number);
            if self.options.dry_run {
                return Ok(());
            }
            tx.update_resource(
                resource.id,
                &ResourceUpdate::error(format!(
                    "some file(s) of this resource failed to download: {note}"
                )),
            )
            .await?;
            tx.commit().await?;
            warn!(resource_id = %resource.resource_id, "Resource download failed");
        } else if is_complete {
            eprintln!(
                "Resource {} download completed ({})",
                resource.title, resource.save_path
            );
            if self.options.dry_run {
                return Ok(());
            }
            tx.update_resource(resource.id, &ResourceUpdate::status(ResourceStatus::Completed))
                .await?;
            tx.commit().await?;
            info!(resource_id = %resource.resource_id, "Resource download completed");
            for child in &children {
                if !child.download_id.is_empty() {
                    self.delete_task(&child.download_id).await;
                }
            }
        }
        Ok(())
    }

    /// Admits the most recently updated queued standalone file.
    /// Returns the backoff delay when submission failed.
    async fn admit_file(&mut self) -> Result<Option<Duration>, WatchError> {
        let row = match self.queue.next_queued_file().await {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!("No new file to add");
                return Ok(None);
            }
            Err(err) => {
                error!(error = %err, "Failed to read new file");
                return Ok(None);
            }
        };
        eprintln!("Add new file download {} to client", row.filename);
        if self.options.dry_run {
            return Ok(None);
        }

        let save_path = self.client.config().save_path.clone();
        let result =
            match add_download_task(&self.registry, self.client.as_ref(), &row.file_id, &save_path)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    let mut tx = self.queue.begin().await?;
                    self.record_file_failure(&mut tx, &row, &err.to_string())
                        .await?;
                    tx.commit().await?;
                    let delay = self.admission_backoff.fail();
                    error!(error = %err, delay_secs = delay.as_secs(), "Failed to add new file to client");
                    return Ok(Some(delay));
                }
            };
        self.admission_backoff.reset();

        let created = first_row(&row.file_id, &result)?;
        let mut tx = self.queue.begin().await?;
        tx.update_file(
            row.id,
            &FileUpdate {
                status: Some(created.status),
                download_id: Some(created.download_id.clone()),
                save_path: Some(save_path),
                client: Some(self.client.name().to_string()),
                note: None,
            },
        )
        .await?;
        tx.commit().await?;
        info!(filename = %row.filename, download_id = %created.download_id, "Admitted file");
        if !row.download_id.is_empty() && row.download_id != created.download_id {
            self.delete_task(&row.download_id).await;
        }
        Ok(None)
    }

    /// Admits the queued resource with the fewest prior failures.
    /// Returns the backoff delay when submission failed.
    async fn admit_resource(&mut self) -> Result<Option<Duration>, WatchError> {
        let resource = match self.queue.next_queued_resource().await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                warn!("No new resource to add");
                return Ok(None);
            }
            Err(err) => {
                error!(error = %err, "Failed to read new resource");
                return Ok(None);
            }
        };
        let folder_name = resource.folder_name();
        eprintln!(
            "Add new resource download {} {} to client",
            resource.number, folder_name
        );
        if self.options.dry_run {
            return Ok(None);
        }

        let save_path = self
            .client
            .join_path(&self.client.config().save_path, &folder_name);
        let result = add_download_task(
            &self.registry,
            self.client.as_ref(),
            &resource.resource_id,
            &save_path,
        )
        .await;
        let reason = result.as_ref().err().map(ToString::to_string);
        if let Err(err) = self.record_resource_failure(&resource, reason.as_deref()).await {
            error!(error = %err, "Failed to record resource failure");
        }
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                let delay = self.admission_backoff.fail();
                error!(error = %err, delay_secs = delay.as_secs(), "Failed to add new resource to client");
                return Ok(Some(delay));
            }
        };
        self.admission_backoff.reset();
        trace!(count = result.rows.len(), "Files added to client");

        if let Err(err) = self.store_resource_rows(&resource, &save_path, &result).await {
            error!(error = %err, "Failed to update db for added new resource");
        }
        Ok(None)
    }

    /// Replaces the resource's file rows with freshly admitted ones.
    async fn store_resource_rows(
        &mut self,
        resource: &ResourceDownload,
        save_path: &str,
        result: &AdmissionResult,
    ) -> Result<(), WatchError> {
        let mut tx = self.queue.begin().await?;
        let stale = tx
            .find_files(
                &FileFilter::new()
                    .client(self.client.name())
                    .resource(&resource.resource_id),
            )
            .await?;
        let stale_ids: Vec<i64> = stale.iter().map(|row| row.id).collect();
        if !stale_ids.is_empty() {
            tx.delete_files(&stale_ids).await?;
        }
        tx.update_resource(
            resource.id,
            &ResourceUpdate {
                status: Some(ResourceStatus::Downloading),
                save_path: Some(save_path.to_string()),
                client: Some(self.client.name().to_string()),
                ..ResourceUpdate::default()
            },
        )
        .await?;
        for row in &result.rows {
            tx.insert_file(row).await?;
        }
        tx.commit().await?;
        info!(
            resource_id = %resource.resource_id,
            files = result.rows.len(),
            replaced = stale.len(),
            "Admitted resource"
        );
        for row in &stale {
            if !row.download_id.is_empty() {
                self.delete_task(&row.download_id).await;
            }
        }
        Ok(())
    }

    /// Counts a submission failure of `row`; at the threshold marks it
    /// `error` inside `tx` and returns `true`.
    async fn record_file_failure(
        &mut self,
        tx: &mut QueueTx,
        row: &FileDownload,
        reason: &str,
    ) -> Result<bool, WatchError> {
        error!(filename = %row.filename, error = %reason, "Failed to add file");
        if !self.failures.record(&row.file_id) {
            return Ok(false);
        }
        eprintln!("File {} download error due to too many fails", row.file_id);
        if !self.options.dry_run {
            tx.update_file(
                row.id,
                &FileUpdate::error(format!("Failed too many times. Last error: {reason}")),
            )
            .await?;
        }
        self.failures.clear(&row.file_id);
        Ok(true)
    }

    /// Counts (or, with `reason == None`, clears) a resource submission
    /// failure. Returns `true` when the resource became `error`.
    async fn record_resource_failure(
        &mut self,
        resource: &ResourceDownload,
        reason: Option<&str>,
    ) -> Result<bool, WatchError> {
        let Some(reason) = reason else {
            self.failures.clear(&resource.resource_id);
            return Ok(false);
        };
        let too_many = self.failures.record(&resource.resource_id);
        let mut update = ResourceUpdate {
            failed: Some(resource.failed + 1),
            ..ResourceUpdate::default()
        };
        if too_many {
            eprintln!(
                "Resource {} download error due to too many fails",
                resource.number
            );
            update.status = Some(ResourceStatus::Error);
            update.note = Some(format!("Failed too many times. Last error: {reason}"));
        }
        self.queue.update_resource(resource.id, &update).await?;
        if too_many {
            self.failures.clear(&resource.resource_id);
        }
        Ok(too_many)
    }

    /// Best-effort removal of a client task.
    async fn delete_task(&self, id: &str) {
        if let Err(err) = self.client.delete(id).await {
            debug!(id = %id, error = %err, "Failed to delete client task");
        }
    }
}

fn first_row<'a>(
    id: &str,
    result: &'a AdmissionResult,
) -> Result<&'a crate::queue::NewFileDownload, WatchError> {
    result
        .rows
        .first()
        .ok_or_else(|| WatchError::NothingAdmitted { id: id.to_string() })
}
