//! Integration tests for the watch loop.
//!
//! Each test drives [`WatchLoop::run_cycle`] against an in-memory client and
//! a real SQLite queue, then inspects both sides.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mediadl_core::client::ClientTask;
use mediadl_core::config::ClientConfig;
use mediadl_core::queue::{
    FileFilter, FileUpdate, NewFileDownload, NewResourceDownload, ResourceUpdate,
};
use mediadl_core::site::stable_identifier;
use mediadl_core::watch::CycleOutcome;
use mediadl_core::watch::control::{ControlCommand, listen};
use mediadl_core::{
    FileStatus, Queue, ResourceStatus, TaskStatus, WatchExit, WatchLoop, WatchOptions,
};
use support::{MOCK_CLIENT, MockClient, file_id, registry_with, resource_id, setup_queue};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SAVE_PATH: &str = "/downloads";

fn options() -> WatchOptions {
    WatchOptions {
        max_jitter: Duration::ZERO,
        ..WatchOptions::default()
    }
}

fn watcher(queue: &Queue, client: &Arc<MockClient>, options: WatchOptions) -> WatchLoop {
    WatchLoop::new(
        queue.clone(),
        client.clone(),
        registry_with(client.clone()),
        options,
    )
}

async fn enqueue_url(queue: &Queue, url: &str) -> i64 {
    let id = file_id(url);
    queue
        .insert_file(&NewFileDownload {
            identifier: stable_identifier(&id),
            file_id: id,
            site: "direct".to_string(),
            file_url: url.to_string(),
            filename: url.rsplit('/').next().unwrap_or_default().to_string(),
            status: FileStatus::Queued,
            ..NewFileDownload::default()
        })
        .await
        .expect("Failed to insert file")
}

fn foreign_task(id: &str) -> ClientTask {
    ClientTask {
        id: id.to_string(),
        filename: format!("{id}.bin"),
        size: 1,
        save_path: SAVE_PATH.to_string(),
        status: TaskStatus::Downloading,
        msg: String::new(),
    }
}

async fn enqueue_resource(queue: &Queue, number: &str, urls: &[&str]) -> i64 {
    let id = resource_id(number, "Title", urls);
    queue
        .insert_resource(&NewResourceDownload {
            identifier: stable_identifier(&id),
            resource_id: id,
            site: "direct".to_string(),
            number: number.to_string(),
            title: "Title".to_string(),
            ..NewResourceDownload::default()
        })
        .await
        .expect("Failed to insert resource")
}

// ==================== File Admission ====================

#[tokio::test]
async fn test_cycle_admits_queued_file() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());

    let outcome = watch.run_cycle().await.expect("cycle failed");
    assert_eq!(outcome, CycleOutcome::Completed);

    let added = client.added();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].url, "http://example.com/a.zip");
    assert_eq!(added[0].filename, "a.zip");

    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Downloading);
    assert_eq!(row.client, MOCK_CLIENT);
    assert_eq!(row.save_path, SAVE_PATH);
    assert_eq!(client.task_ids(), vec![row.download_id.clone()]);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            dry_run: true,
            ..options()
        },
    );

    watch.run_cycle().await.expect("cycle failed");

    assert!(client.added().is_empty());
    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Queued);
    assert!(row.download_id.is_empty());
}

#[tokio::test]
async fn test_admission_stops_at_max_downloads() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    enqueue_url(&queue, "http://example.com/a.zip").await;
    enqueue_url(&queue, "http://example.com/b.zip").await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            max_downloads: 1,
            ..options()
        },
    );

    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Completed
    );
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Saturated
    );
    assert_eq!(client.added().len(), 1);
    assert!(queue.next_queued_file().await.expect("select").is_some());
}

#[tokio::test]
async fn test_four_downloading_tasks_close_the_gate() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    for id in ["t1", "t2", "t3", "t4"] {
        client.inject(foreign_task(id));
    }
    enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());

    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Saturated
    );
    assert!(client.added().is_empty());

    client.lose("t4");
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Completed
    );
    assert_eq!(client.added().len(), 1);
    assert!(queue.next_queued_file().await.expect("select").is_none());
}

#[tokio::test]
async fn test_rejected_file_counts_failures_until_error() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    client.set_reject_add(true);
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let key = file_id("http://example.com/a.zip");
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            failure_threshold: 2,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(8),
            ..options()
        },
    );

    let first = watch.run_cycle().await.expect("cycle failed");
    assert_eq!(first, CycleOutcome::AdmissionFailed(Duration::from_secs(1)));
    assert_eq!(watch.failure_count(&key), 1);
    assert_eq!(
        queue.get_file(row_id).await.expect("get").status(),
        FileStatus::Queued
    );

    let second = watch.run_cycle().await.expect("cycle failed");
    assert_eq!(second, CycleOutcome::AdmissionFailed(Duration::from_secs(2)));
    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Error);
    assert!(row.note.starts_with("Failed too many times. Last error:"));
    assert_eq!(watch.failure_count(&key), 0);
}

// ==================== Task Reconciliation ====================

#[tokio::test]
async fn test_completed_task_completes_row_and_is_removed() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());
    watch.run_cycle().await.expect("cycle failed");
    let task_id = queue.get_file(row_id).await.expect("get").download_id;

    client.set_status(&task_id, TaskStatus::Completed, "");
    watch.run_cycle().await.expect("cycle failed");

    assert_eq!(
        queue.get_file(row_id).await.expect("get").status(),
        FileStatus::Completed
    );
    assert_eq!(client.deleted(), vec![task_id]);
    assert!(client.task_ids().is_empty());
}

#[tokio::test]
async fn test_error_task_is_recreated() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());
    watch.run_cycle().await.expect("cycle failed");
    let first_task = queue.get_file(row_id).await.expect("get").download_id;

    client.set_status(&first_task, TaskStatus::Error, "Err-1:network");
    watch.run_cycle().await.expect("cycle failed");

    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Downloading);
    assert_ne!(row.download_id, first_task);
    assert!(row.note.is_empty());
    assert_eq!(client.added().len(), 2);
    assert!(client.deleted().contains(&first_task));
    assert_eq!(watch.failure_count(&file_id("http://example.com/a.zip")), 1);
}

#[tokio::test]
async fn test_repeated_task_errors_mark_file_error() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            failure_threshold: 2,
            ..options()
        },
    );
    watch.run_cycle().await.expect("cycle failed");

    for _ in 0..2 {
        let task_id = queue.get_file(row_id).await.expect("get").download_id;
        client.set_status(&task_id, TaskStatus::Error, "Err-3:not found");
        watch.run_cycle().await.expect("cycle failed");
    }

    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Error);
    assert!(row.note.contains("Err-3:not found"));
    assert!(client.task_ids().is_empty());
}

#[tokio::test]
async fn test_dry_run_threshold_keeps_client_task() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    watcher(&queue, &client, options())
        .run_cycle()
        .await
        .expect("cycle failed");
    let task_id = queue.get_file(row_id).await.expect("get").download_id;
    client.set_status(&task_id, TaskStatus::Error, "Err-1:network");

    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            dry_run: true,
            failure_threshold: 2,
            ..options()
        },
    );
    watch.run_cycle().await.expect("cycle failed");
    watch.run_cycle().await.expect("cycle failed");

    assert!(client.deleted().is_empty());
    assert_eq!(client.task_ids(), vec![task_id.clone()]);
    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Downloading);
    assert_eq!(row.download_id, task_id);
    assert!(row.note.is_empty());
}

#[tokio::test]
async fn test_lost_task_is_resubmitted() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());
    watch.run_cycle().await.expect("cycle failed");
    let lost = queue.get_file(row_id).await.expect("get").download_id;

    client.lose(&lost);
    watch.run_cycle().await.expect("cycle failed");

    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Downloading);
    assert_ne!(row.download_id, lost);
    assert_eq!(client.task_ids(), vec![row.download_id]);
}

#[tokio::test]
async fn test_lost_task_finished_locally_frees_a_slot() {
    let (queue, _temp_dir) = setup_queue().await;
    let downloads = TempDir::new().expect("Failed to create temp dir");
    let client = Arc::new(MockClient::with_config(ClientConfig {
        name: MOCK_CLIENT.to_string(),
        save_path: downloads.path().to_str().expect("utf-8 temp path").to_string(),
        local: true,
        ..ClientConfig::default()
    }));
    let first = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            max_downloads: 1,
            ..options()
        },
    );
    watch.run_cycle().await.expect("cycle failed");
    let lost = queue.get_file(first).await.expect("get").download_id;
    std::fs::write(downloads.path().join("a.zip"), b"done").expect("write");
    client.lose(&lost);
    enqueue_url(&queue, "http://example.com/b.zip").await;

    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Completed
    );

    assert_eq!(
        queue.get_file(first).await.expect("get").status(),
        FileStatus::Completed
    );
    let added: Vec<String> = client.added().into_iter().map(|r| r.filename).collect();
    assert_eq!(added, vec!["a.zip", "b.zip"]);
}

#[tokio::test]
async fn test_unknown_client_tasks_are_left_alone() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    client.inject(ClientTask {
        id: "foreign".to_string(),
        filename: "x.bin".to_string(),
        size: 1,
        save_path: SAVE_PATH.to_string(),
        status: TaskStatus::Completed,
        msg: String::new(),
    });
    let mut watch = watcher(&queue, &client, options());

    watch.run_cycle().await.expect("cycle failed");

    assert!(client.deleted().is_empty());
    assert_eq!(client.task_ids(), vec!["foreign".to_string()]);
}

#[tokio::test]
async fn test_unreachable_client_backs_off() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    client.set_offline(true);
    let mut watch = watcher(&queue, &client, options());

    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::ClientUnavailable(Duration::from_secs(1))
    );
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::ClientUnavailable(Duration::from_secs(2))
    );

    client.set_offline(false);
    watch.run_cycle().await.expect("cycle failed");
    client.set_offline(true);
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::ClientUnavailable(Duration::from_secs(1))
    );
}

// ==================== Resources ====================

#[tokio::test]
async fn test_resource_admitted_then_completed() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let res = enqueue_resource(
        &queue,
        "42",
        &["http://example.com/a.zip", "http://example.com/b.zip"],
    )
    .await;
    let mut watch = watcher(&queue, &client, options());

    watch.run_cycle().await.expect("cycle failed");

    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Downloading);
    assert_eq!(resource.save_path, "/downloads/[42]Title");
    assert_eq!(resource.client, MOCK_CLIENT);
    let files = queue
        .find_files(&FileFilter::new().resource(&resource.resource_id))
        .await
        .expect("find");
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.status() == FileStatus::Downloading));
    assert!(files.iter().all(|f| f.save_path == "/downloads/[42]Title"));

    for file in &files {
        client.set_status(&file.download_id, TaskStatus::Completed, "");
    }
    watch.run_cycle().await.expect("cycle failed");

    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Completed);
    assert!(client.task_ids().is_empty());
}

#[tokio::test]
async fn test_resource_with_failed_file_becomes_error() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let res = enqueue_resource(
        &queue,
        "7",
        &["http://example.com/a.zip", "http://example.com/b.zip"],
    )
    .await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            failure_threshold: 1,
            ..options()
        },
    );
    watch.run_cycle().await.expect("cycle failed");
    let resource = queue.get_resource(res).await.expect("get");
    let files = queue
        .find_files(&FileFilter::new().resource(&resource.resource_id))
        .await
        .expect("find");

    client.set_status(&files[0].download_id, TaskStatus::Error, "Err-1:gone");
    watch.run_cycle().await.expect("cycle failed");

    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Error);
    assert!(
        resource
            .note
            .starts_with("some file(s) of this resource failed to download")
    );
    assert!(resource.note.contains(&files[0].filename));
}

#[tokio::test]
async fn test_downloading_resource_without_files_becomes_error() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let res = enqueue_resource(&queue, "5", &["http://example.com/a.zip"]).await;
    queue
        .update_resource(
            res,
            &ResourceUpdate {
                status: Some(ResourceStatus::Downloading),
                client: Some(MOCK_CLIENT.to_string()),
                ..ResourceUpdate::default()
            },
        )
        .await
        .expect("update");
    let mut watch = watcher(&queue, &client, options());

    watch.run_cycle().await.expect("cycle failed");

    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Error);
    assert_eq!(
        resource.note,
        "some file(s) of this resource failed to download: No file downloads task"
    );
    assert!(client.added().is_empty());
}

#[tokio::test]
async fn test_readmitted_resource_replaces_stale_files() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let res = enqueue_resource(
        &queue,
        "8",
        &["http://example.com/a.zip", "http://example.com/b.zip"],
    )
    .await;
    let mut watch = watcher(&queue, &client, options());
    watch.run_cycle().await.expect("cycle failed");
    let resource_key = queue.get_resource(res).await.expect("get").resource_id;
    let stale = queue
        .find_files(&FileFilter::new().resource(&resource_key))
        .await
        .expect("find");
    assert_eq!(stale.len(), 2);

    queue
        .update_resource(res, &ResourceUpdate::status(ResourceStatus::Queued))
        .await
        .expect("requeue");
    watch.run_cycle().await.expect("cycle failed");

    for row in &stale {
        assert!(queue.get_file(row.id).await.is_err());
        assert!(client.deleted().contains(&row.download_id));
    }
    let fresh = queue
        .find_files(&FileFilter::new().resource(&resource_key))
        .await
        .expect("find");
    assert_eq!(fresh.len(), 2);
    let mut fresh_ids: Vec<String> = fresh.into_iter().map(|row| row.download_id).collect();
    fresh_ids.sort();
    let mut live = client.task_ids();
    live.sort();
    assert_eq!(live, fresh_ids);
    assert_eq!(
        queue.get_resource(res).await.expect("get").status(),
        ResourceStatus::Downloading
    );
}

#[tokio::test]
async fn test_rejected_resource_records_failures() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    client.set_reject_add(true);
    let res = enqueue_resource(&queue, "9", &["http://example.com/a.zip"]).await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            failure_threshold: 2,
            ..options()
        },
    );

    assert!(matches!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::AdmissionFailed(_)
    ));
    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Queued);
    assert_eq!(resource.failed, 1);

    watch.run_cycle().await.expect("cycle failed");
    let resource = queue.get_resource(res).await.expect("get");
    assert_eq!(resource.status(), ResourceStatus::Error);
    assert_eq!(resource.failed, 2);
    assert!(resource.note.contains("download rejected"));
}

// ==================== Run / Stop ====================

#[tokio::test]
async fn test_stop_mode_returns_when_queue_drained() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            stop_when_idle: true,
            ..options()
        },
    );

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        watch.run(CancellationToken::new()),
    )
    .await
    .expect("watch loop did not stop");
    assert_eq!(exit, WatchExit::Idle);
}

#[tokio::test]
async fn test_stop_mode_waits_for_downloads() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            stop_when_idle: true,
            ..options()
        },
    );

    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Completed
    );
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Completed
    );

    let task_id = client.task_ids().remove(0);
    client.set_status(&task_id, TaskStatus::Completed, "");
    assert_eq!(
        watch.run_cycle().await.expect("cycle failed"),
        CycleOutcome::Idle
    );
}

#[tokio::test]
async fn test_cancel_interrupts_sleep() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let mut watch = watcher(
        &queue,
        &client,
        WatchOptions {
            interval: Duration::from_secs(3600),
            ..options()
        },
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let exit = tokio::time::timeout(Duration::from_secs(5), watch.run(cancel))
        .await
        .expect("watch loop ignored cancellation");
    assert_eq!(exit, WatchExit::Cancelled);
}

// ==================== Control Commands ====================

#[tokio::test]
async fn test_reset_command_resubmits_error_files() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    let mut watch = watcher(&queue, &client, options());
    watch.run_cycle().await.expect("cycle failed");
    let old_task = queue.get_file(row_id).await.expect("get").download_id;
    client.lose(&old_task);
    queue
        .update_file(row_id, &FileUpdate::error("gave up"))
        .await
        .expect("update");

    let output = ControlCommand::ForceErrorDownloading
        .execute(&queue, client.as_ref())
        .await
        .expect("command failed");
    assert_eq!(output, "1 error file(s) set to downloading");

    watch.run_cycle().await.expect("cycle failed");
    let row = queue.get_file(row_id).await.expect("get");
    assert_eq!(row.status(), FileStatus::Downloading);
    assert_ne!(row.download_id, old_task);
}

#[tokio::test]
async fn test_listener_runs_commands_until_eof() {
    let (queue, _temp_dir) = setup_queue().await;
    let client = Arc::new(MockClient::new(SAVE_PATH));
    let row_id = enqueue_url(&queue, "http://example.com/a.zip").await;
    queue
        .update_file(row_id, &FileUpdate::error("gave up"))
        .await
        .expect("update");

    let input = tokio::io::BufReader::new(&b"p\nbogus\nreset\n"[..]);
    tokio::time::timeout(
        Duration::from_secs(5),
        listen(input, queue.clone(), client, CancellationToken::new()),
    )
    .await
    .expect("listener did not stop at EOF");

    assert_eq!(
        queue.get_file(row_id).await.expect("get").status(),
        FileStatus::Downloading
    );
}
