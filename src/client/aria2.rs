//! aria2 download client over JSON-RPC 2.0.
//!
//! See <https://aria2.github.io/manual/en/html/aria2c.html#rpc-interface>.
//! Every numeric field in aria2 responses is a decimal string.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use super::{
    AddRequest, ClientError, ClientStatus, ClientTask, ClientTasks, DownloadClient, TaskStatus,
    local_file_complete,
};
use crate::config::{ClientConfig, CookieConfig, cookie_header};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;
const RPC_ID: &str = "mediadl";
/// `num` argument for `tellWaiting` / `tellStopped`.
const LIST_LIMIT: i64 = 9999;

/// aria2 JSON-RPC client.
#[derive(Debug)]
pub struct Aria2Client {
    config: ClientConfig,
    user_agent: String,
    cookies: Vec<CookieConfig>,
    rpc_host: String,
    http: RwLock<Client>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Options accepted by `aria2.addUri`.
#[derive(Debug, Default, Serialize)]
struct InputOptions {
    #[serde(skip_serializing_if = "String::is_empty")]
    dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    out: String,
    pause: String,
    #[serde(rename = "user-agent", skip_serializing_if = "String::is_empty")]
    user_agent: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    header: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GlobalStat {
    download_speed: String,
    upload_speed: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiFile {
    path: String,
    length: String,
}

/// Reply of `aria2.tellStatus` and the `tell*` listings.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiStatus {
    gid: String,
    /// active|waiting|paused|error|complete|removed
    status: String,
    dir: String,
    files: Vec<ApiFile>,
    error_code: String,
    error_message: String,
}

impl ApiStatus {
    fn is_removed(&self) -> bool {
        self.status == "removed"
    }

    fn msg(&self) -> String {
        if self.error_code.is_empty() || self.error_code == "0" {
            String::new()
        } else {
            format!("Err-{}:{}", self.error_code, self.error_message)
        }
    }
}

impl From<ApiStatus> for ClientTask {
    fn from(status: ApiStatus) -> Self {
        let msg = status.msg();
        let (filename, size) = match status.files.as_slice() {
            [file] => (
                base_name(&file.path).to_string(),
                file.length.parse().unwrap_or(0),
            ),
            _ => (String::new(), 0),
        };
        Self {
            id: status.gid,
            filename,
            size,
            save_path: status.dir,
            status: map_status(&status.status),
            msg,
        }
    }
}

fn map_status(aria2_status: &str) -> TaskStatus {
    match aria2_status {
        "active" | "waiting" => TaskStatus::Downloading,
        "complete" => TaskStatus::Completed,
        "removed" => TaskStatus::Deleted,
        "paused" => TaskStatus::Paused,
        "error" => TaskStatus::Error,
        _ => TaskStatus::Unknown,
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn build_http_client() -> Result<Client, ClientError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .build()
        .map_err(ClientError::Build)
}

impl Aria2Client {
    /// Creates a client for the RPC endpoint in `config`.
    ///
    /// `user_agent` and matching `cookies` are forwarded to aria2 with every
    /// new download.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no endpoint is configured,
    /// [`ClientError::InvalidUrl`] when it does not parse, and
    /// [`ClientError::Build`] when the HTTP transport cannot be built.
    pub fn new(
        config: ClientConfig,
        user_agent: impl Into<String>,
        cookies: Vec<CookieConfig>,
    ) -> Result<Self, ClientError> {
        if config.url.is_empty() {
            return Err(ClientError::config(&config.name, "no rpc url"));
        }
        let rpc_url = Url::parse(&config.url).map_err(|source| ClientError::InvalidUrl {
            url: config.url.clone(),
            source,
        })?;
        Ok(Self {
            rpc_host: rpc_url.host_str().unwrap_or_default().to_string(),
            config,
            user_agent: user_agent.into(),
            cookies,
            http: RwLock::new(build_http_client()?),
        })
    }

    fn http(&self) -> Client {
        match self.http.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Positional params, prefixed with `token:SECRET` when a secret is set.
    fn params(&self, args: Vec<Value>) -> Vec<Value> {
        let mut params = Vec::with_capacity(args.len() + 1);
        if !self.config.token.is_empty() {
            params.push(Value::String(format!("token:{}", self.config.token)));
        }
        params.extend(args);
        params
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, ClientError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": RPC_ID,
            "method": method,
            "params": self.params(args),
        });
        let response = self
            .http()
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::network(method, &self.config.url, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::network(method, &self.config.url, e))?;
        let parsed: RpcResponse<T> = serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::invalid_response(method, format!("HTTP {status}: {e}"))
        })?;
        if let Some(error) = parsed.error {
            return Err(ClientError::Rpc {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| ClientError::invalid_response(method, format!("HTTP {status}: no result")))
    }

    async fn list(&self, method: &str, args: Vec<Value>) -> Result<Vec<ApiStatus>, ClientError> {
        self.call(method, args).await
    }
}

#[async_trait]
impl DownloadClient for Aria2Client {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn get_status(&self) -> Result<ClientStatus, ClientError> {
        let stat: GlobalStat = self.call("aria2.getGlobalStat", vec![]).await?;
        Ok(ClientStatus {
            download_speed: stat.download_speed.parse().unwrap_or(0),
            upload_speed: stat.upload_speed.parse().unwrap_or(0),
        })
    }

    #[instrument(skip(self, request), fields(client = %self.config.name, filename = %request.filename))]
    async fn add(&self, request: &AddRequest) -> Result<String, ClientError> {
        let save_path = if request.save_path.is_empty() {
            self.config.save_path.as_str()
        } else {
            request.save_path.as_str()
        };
        if self.config.local && local_file_complete(save_path, &request.filename) {
            return Err(ClientError::FileExists {
                path: self.join_path(save_path, &request.filename),
            });
        }
        let url = Url::parse(&request.url).map_err(|source| ClientError::InvalidUrl {
            url: request.url.clone(),
            source,
        })?;
        let mut header = vec![format!("Host: {}", host_header(&url))];
        if let Some(cookie) = cookie_header(&self.cookies, &url) {
            header.push(format!("Cookie: {cookie}"));
        }
        let options = InputOptions {
            dir: save_path.to_string(),
            out: request.filename.clone(),
            pause: request.paused.to_string(),
            user_agent: self.user_agent.clone(),
            header,
        };
        let id: String = self
            .call("aria2.addUri", vec![json!([request.url]), json!(options)])
            .await?;
        debug!(id = %id, "aria2 task created");
        Ok(id)
    }

    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn get(&self, id: &str) -> Result<ClientTask, ClientError> {
        let status: ApiStatus = self.call("aria2.tellStatus", vec![json!(id)]).await?;
        if status.is_removed() {
            return Err(ClientError::not_found(id));
        }
        Ok(status.into())
    }

    /// `forceRemove` only works on unfinished tasks; finished ones
    /// (complete/error/removed) are rejected and only need their result
    /// removed.
    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let removed = self
            .call::<String>("aria2.forceRemove", vec![json!(id)])
            .await;
        let cleared = self
            .call::<String>("aria2.removeDownloadResult", vec![json!(id)])
            .await;
        match removed {
            Err(err) if err.is_rejected() => cleared.map(|_| ()),
            other => other.map(|_| ()),
        }
    }

    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn pause(&self, id: &str) -> Result<(), ClientError> {
        let result: String = self.call("aria2.forcePause", vec![json!(id)]).await?;
        if result != "OK" {
            return Err(ClientError::UnexpectedResult {
                method: "aria2.forcePause".to_string(),
                result,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn resume(&self, id: &str) -> Result<(), ClientError> {
        self.call::<String>("aria2.unpause", vec![json!(id)])
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(client = %self.config.name))]
    async fn get_all(&self) -> Result<ClientTasks, ClientError> {
        let mut tasks = ClientTasks::new();
        let active = self.list("aria2.tellActive", vec![]).await?;
        let waiting = self
            .list("aria2.tellWaiting", vec![json!(0), json!(LIST_LIMIT)])
            .await?;
        let stopped = self
            .list("aria2.tellStopped", vec![json!(0), json!(LIST_LIMIT)])
            .await?;
        for status in active.into_iter().chain(waiting).chain(stopped) {
            if status.is_removed() {
                continue;
            }
            tasks.insert(status.gid.clone(), status.into());
        }
        Ok(tasks)
    }

    async fn reset_connections(&self, host: &str) -> Result<bool, ClientError> {
        if !host.is_empty() && host != self.rpc_host {
            return Ok(false);
        }
        let fresh = build_http_client()?;
        match self.http.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        info!(client = %self.config.name, host = %self.rpc_host, "Reset RPC connections");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(token: &str) -> Aria2Client {
        Aria2Client::new(
            ClientConfig {
                name: "local".to_string(),
                url: "http://localhost:6800/jsonrpc".to_string(),
                token: token.to_string(),
                ..ClientConfig::default()
            },
            "",
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status("active"), TaskStatus::Downloading);
        assert_eq!(map_status("waiting"), TaskStatus::Downloading);
        assert_eq!(map_status("complete"), TaskStatus::Completed);
        assert_eq!(map_status("removed"), TaskStatus::Deleted);
        assert_eq!(map_status("paused"), TaskStatus::Paused);
        assert_eq!(map_status("error"), TaskStatus::Error);
        assert_eq!(map_status("bogus"), TaskStatus::Unknown);
    }

    #[test]
    fn test_params_prefix_token() {
        assert_eq!(
            client("s3cret").params(vec![json!("gid")]),
            vec![json!("token:s3cret"), json!("gid")]
        );
        assert_eq!(client("").params(vec![json!("gid")]), vec![json!("gid")]);
    }

    #[test]
    fn test_api_status_into_task() {
        let status: ApiStatus = serde_json::from_value(json!({
            "gid": "2089b05ecca3d829",
            "status": "error",
            "dir": "/data",
            "files": [{"index": "1", "path": "/data/sub/a.zip", "length": "1024"}],
            "errorCode": "3",
            "errorMessage": "Resource not found"
        }))
        .unwrap();
        let task = ClientTask::from(status);
        assert_eq!(task.id, "2089b05ecca3d829");
        assert_eq!(task.filename, "a.zip");
        assert_eq!(task.size, 1024);
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.msg, "Err-3:Resource not found");
    }

    #[test]
    fn test_api_status_zero_error_code_has_no_msg() {
        let status: ApiStatus =
            serde_json::from_value(json!({"gid": "1", "status": "complete", "errorCode": "0"}))
                .unwrap();
        let task = ClientTask::from(status);
        assert!(task.msg.is_empty());
        assert!(task.filename.is_empty());
    }

    #[test]
    fn test_host_header_keeps_port() {
        let url = Url::parse("http://files.example.com:8080/a").unwrap();
        assert_eq!(host_header(&url), "files.example.com:8080");
    }

    #[test]
    fn test_new_requires_url() {
        let err = Aria2Client::new(ClientConfig::default(), "", Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::Config { .. }));
    }

    #[tokio::test]
    async fn test_add_local_existing_file_skips_rpc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.zip"), b"done").unwrap();
        let client = Aria2Client::new(
            ClientConfig {
                name: "local".to_string(),
                // Unroutable: any RPC attempt would fail with a network error.
                url: "http://127.0.0.1:9/jsonrpc".to_string(),
                local: true,
                ..ClientConfig::default()
            },
            "",
            Vec::new(),
        )
        .unwrap();
        let err = client
            .add(&AddRequest {
                url: "http://example.com/a.zip".to_string(),
                filename: "a.zip".to_string(),
                save_path: dir.path().to_string_lossy().into_owned(),
                paused: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FileExists { .. }));
    }
}
