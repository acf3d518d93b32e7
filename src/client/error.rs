//! Error types for download client operations.

use thiserror::Error;

/// Errors returned by a [`DownloadClient`](super::DownloadClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The target file is already fully present on the client's filesystem.
    ///
    /// Not a failure: admission treats it as an already-completed download.
    #[error("local file exists: {path}")]
    FileExists {
        /// Full path of the existing file.
        path: String,
    },

    /// The client does not know this task id (or only as a removed task).
    #[error("download task {id} not found")]
    NotFound {
        /// The task id that was looked up.
        id: String,
    },

    /// Transport-level failure talking to the client.
    #[error("network error calling {method} on {url}: {source}")]
    Network {
        /// RPC method being called.
        method: String,
        /// Endpoint URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The client answered with a JSON-RPC error object.
    #[error("{method} rejected (code {code}): {message}")]
    Rpc {
        /// RPC method being called.
        method: String,
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the client.
        message: String,
    },

    /// The response could not be decoded or had no result.
    #[error("invalid response to {method}: {reason}")]
    InvalidResponse {
        /// RPC method being called.
        method: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The result decoded fine but is not what the method promises.
    #[error("unexpected result from {method}: {result}")]
    UnexpectedResult {
        /// RPC method being called.
        method: String,
        /// The raw result value.
        result: String,
    },

    /// A download URL could not be parsed.
    #[error("invalid download url {url}: {source}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The client configuration is unusable.
    #[error("invalid configuration for client {name}: {reason}")]
    Config {
        /// Client name.
        name: String,
        /// What is missing or wrong.
        reason: String,
    },

    /// The HTTP transport could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    /// Creates a network error for an RPC call.
    pub fn network(method: &str, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            method: method.to_string(),
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a configuration error.
    pub fn config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// `true` when the client understood the call and refused it.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// `true` for failures that say nothing about the task itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::InvalidResponse { .. } | Self::Build(_)
        )
    }
}
