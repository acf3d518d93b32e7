//! Shared fixtures for integration tests: an in-memory download client, a
//! temp-dir queue, and registry wiring around the direct site.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mediadl_core::client::{AddRequest, ClientStatus, ClientTasks};
use mediadl_core::config::ClientConfig;
use mediadl_core::site::{DirectSite, build_identifier};
use mediadl_core::{ClientError, ClientTask, Database, DownloadClient, Queue, Registry, TaskStatus};
use tempfile::TempDir;

/// Name the mock client registers under.
pub const MOCK_CLIENT: &str = "mock";

#[derive(Debug, Default)]
struct MockState {
    tasks: ClientTasks,
    next_id: u64,
    added: Vec<AddRequest>,
    deleted: Vec<String>,
    offline: bool,
    reject_add: bool,
}

/// A download client that keeps its tasks in memory.
///
/// New tasks start out downloading; tests move them along with
/// [`MockClient::set_status`] or drop them with [`MockClient::lose`].
#[derive(Debug)]
pub struct MockClient {
    config: ClientConfig,
    state: Mutex<MockState>,
}

impl MockClient {
    pub fn new(save_path: &str) -> Self {
        Self::with_config(ClientConfig {
            name: MOCK_CLIENT.to_string(),
            save_path: save_path.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock client state poisoned")
    }

    /// Every listing and status call fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Every `add` fails with an RPC rejection while set.
    pub fn set_reject_add(&self, reject: bool) {
        self.state().reject_add = reject;
    }

    pub fn set_status(&self, id: &str, status: TaskStatus, msg: &str) {
        let mut state = self.state();
        let task = state.tasks.get_mut(id).expect("unknown mock task");
        task.status = status;
        task.msg = msg.to_string();
    }

    /// Forgets a task without recording a delete, as if the client restarted.
    pub fn lose(&self, id: &str) {
        self.state().tasks.remove(id);
    }

    /// Inserts a task the queue knows nothing about.
    pub fn inject(&self, task: ClientTask) {
        self.state().tasks.insert(task.id.clone(), task);
    }

    pub fn added(&self) -> Vec<AddRequest> {
        self.state().added.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.state().tasks.keys().cloned().collect()
    }

    pub fn task(&self, id: &str) -> Option<ClientTask> {
        self.state().tasks.get(id).cloned()
    }

    fn unreachable(method: &str) -> ClientError {
        ClientError::invalid_response(method, "connection refused")
    }
}

#[async_trait]
impl DownloadClient for MockClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get_status(&self) -> Result<ClientStatus, ClientError> {
        if self.state().offline {
            return Err(Self::unreachable("getGlobalStat"));
        }
        Ok(ClientStatus::default())
    }

    async fn add(&self, request: &AddRequest) -> Result<String, ClientError> {
        let mut state = self.state();
        if state.offline {
            return Err(Self::unreachable("addUri"));
        }
        if state.reject_add {
            return Err(ClientError::Rpc {
                method: "addUri".to_string(),
                code: 1,
                message: "download rejected".to_string(),
            });
        }
        state.next_id += 1;
        let id = format!("{:016x}", state.next_id);
        let save_path = if request.save_path.is_empty() {
            self.config.save_path.clone()
        } else {
            request.save_path.clone()
        };
        state.tasks.insert(
            id.clone(),
            ClientTask {
                id: id.clone(),
                filename: request.filename.clone(),
                size: 0,
                save_path,
                status: TaskStatus::Downloading,
                msg: String::new(),
            },
        );
        state.added.push(request.clone());
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<ClientTask, ClientError> {
        self.state()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(id))
    }

    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        state.deleted.push(id.to_string());
        state
            .tasks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found(id))
    }

    async fn pause(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found(id))?;
        task.status = TaskStatus::Paused;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let task = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found(id))?;
        task.status = TaskStatus::Downloading;
        Ok(())
    }

    async fn get_all(&self) -> Result<ClientTasks, ClientError> {
        let state = self.state();
        if state.offline {
            return Err(Self::unreachable("tellActive"));
        }
        Ok(state.tasks.clone())
    }
}

/// Creates a file-backed queue inside a fresh temp dir.
pub async fn setup_queue() -> (Queue, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::new(&temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create database");
    (Queue::new(db), temp_dir)
}

/// A registry holding `client` and the built-in direct site.
pub fn registry_with(client: Arc<MockClient>) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register_site(Arc::new(DirectSite::default()));
    registry.register_client(client);
    Arc::new(registry)
}

/// Direct-site file identifier for `url`.
pub fn file_id(url: &str) -> String {
    build_identifier([("site", "direct"), ("url", url)])
}

/// Direct-site resource identifier over `urls`.
pub fn resource_id(number: &str, title: &str, urls: &[&str]) -> String {
    let mut pairs = vec![
        ("site", "direct"),
        ("type", "resource"),
        ("number", number),
        ("title", title),
    ];
    pairs.extend(urls.iter().map(|url| ("url", *url)));
    build_identifier(pairs)
}
