//! mediadl Core Library
//!
//! Queue-driven media acquisition: a persisted queue of files and resources
//! is fed into an external download client by a reconciliation loop, and
//! finished directories are normalized by an idempotent transform pipeline.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`queue`] - File/resource queue persistence and transactions
//! - [`client`] - Download client interface and the aria2 adapter
//! - [`site`] - Content site interface, identifiers and the direct site
//! - [`registry`] - Named clients and sites built from [`config`]
//! - [`admission`] - Expanding an identifier into client downloads
//! - [`watch`] - The reconciliation loop and its stdin control listener
//! - [`transform`] - The directory transform pipeline and its transformers
//! - [`naming`] - Filename cleaning shared by the above

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod client;
pub mod config;
pub mod db;
pub mod naming;
pub mod queue;
pub mod registry;
pub mod site;
pub mod transform;
pub mod watch;

// Re-export commonly used types
pub use admission::{AdmissionError, AdmissionResult, add_download_task};
pub use client::{Aria2Client, ClientError, ClientTask, DownloadClient, TaskStatus};
pub use config::{Config, ConfigError};
pub use db::{Database, DbError};
pub use queue::{
    EnqueueOutcome, FileDownload, FileStatus, Queue, QueueError, ResourceDownload, ResourceStatus,
};
pub use registry::{Registry, RegistryError};
pub use site::{Site, SiteError};
pub use transform::{Pipeline, TransformError, TransformOptions, TransformerRegistry};
pub use watch::{WatchError, WatchExit, WatchLoop, WatchOptions};
