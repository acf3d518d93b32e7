//! Site collaborators: resolve identifiers into downloadable files.
//!
//! Concrete scrapers live outside this crate; the built-in [`DirectSite`]
//! handles plain URLs carried inside the identifier itself.

mod direct;
mod error;
mod identifier;

pub use direct::{DIRECT_SITE_TYPE, DirectSite};
pub use error::SiteError;
pub use identifier::{Identifier, TRANSIENT_FIELDS, build_identifier, stable_identifier};

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

/// One file on a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteFile {
    /// File identifier, accepted by [`Site::get_file`].
    pub id: String,
    /// Canonical filename.
    pub name: String,
    pub size: i64,
    pub is_dir: bool,
    /// `false` when some fields (typically `url`) need a [`Site::get_file`] call.
    pub is_full: bool,
    /// Raw download URL; empty when unknown.
    pub url: String,
    pub tags: Vec<String>,
}

/// A collection of files on a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteResource {
    /// Resource identifier (`type=resource`).
    pub id: String,
    /// Catalogue number.
    pub number: String,
    pub title: String,
    /// Author / circle / label.
    pub author: String,
    /// Not guaranteed to be accurate.
    pub size: i64,
    pub tags: Vec<String>,
}

/// Capability interface of a content site.
#[async_trait]
pub trait Site: Send + Sync + fmt::Debug {
    /// Site name as configured.
    fn name(&self) -> &str;

    /// Resolves one file identifier, including its download URL.
    async fn get_file(&self, id: &str) -> Result<SiteFile, SiteError>;

    /// Lists the member files of a resource; members may be partial.
    async fn get_resource_files(&self, id: &str) -> Result<Vec<SiteFile>, SiteError>;

    /// Fetches the descriptive fields of a resource.
    async fn get_resource(&self, id: &str) -> Result<SiteResource, SiteError>;

    /// Permanent part of `id`: the same object always yields the same
    /// identifier even when access details in `id` change. No side effects.
    fn get_identifier(&self, id: &str) -> String {
        stable_identifier(id)
    }
}
