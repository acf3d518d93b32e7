//! Direct site: identifiers carry the download URLs themselves.
//!
//! - file: `site=NAME&url=URL[&name=FILENAME][&size=N]`
//! - resource: `site=NAME&type=resource&url=U1&url=U2...[&number=][&title=][&author=][&tag=]`
//!
//! Nothing here touches the network; it is the fallback site that makes plain
//! URLs queueable.

use async_trait::async_trait;
use url::Url;

use super::identifier::{Identifier, build_identifier};
use super::{Site, SiteError, SiteFile, SiteResource};
use crate::naming::{clean_file_basename, filename_from_url};

/// Site type name used in configuration.
pub const DIRECT_SITE_TYPE: &str = "direct";

/// A site whose identifiers embed their URLs.
#[derive(Debug, Clone)]
pub struct DirectSite {
    name: String,
}

impl DirectSite {
    /// Creates a direct site registered under `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn member_id(&self, url: &str) -> String {
        build_identifier([("site", self.name.as_str()), ("url", url)])
    }
}

impl Default for DirectSite {
    fn default() -> Self {
        Self::new(DIRECT_SITE_TYPE)
    }
}

fn file_from_url(id: String, raw_url: &str, name: Option<&str>, size: i64) -> Result<SiteFile, SiteError> {
    let url = Url::parse(raw_url).map_err(|e| SiteError::invalid(&id, format!("bad url: {e}")))?;
    let name = match name {
        Some(name) if !name.is_empty() => clean_file_basename(name),
        _ => filename_from_url(&url).unwrap_or_else(|| "download".to_string()),
    };
    Ok(SiteFile {
        id,
        name,
        size,
        is_dir: false,
        is_full: true,
        url: url.to_string(),
        tags: Vec::new(),
    })
}

#[async_trait]
impl Site for DirectSite {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self), fields(site = %self.name))]
    async fn get_file(&self, id: &str) -> Result<SiteFile, SiteError> {
        let parsed = Identifier::parse(id);
        if parsed.is_resource() {
            return Err(SiteError::invalid(id, "is a resource id"));
        }
        let url = parsed
            .get("url")
            .filter(|url| !url.is_empty())
            .ok_or_else(|| SiteError::NoUrl { id: id.to_string() })?;
        let size = parsed.get("size").and_then(|s| s.parse().ok()).unwrap_or(0);
        file_from_url(id.to_string(), url, parsed.get("name"), size)
    }

    #[tracing::instrument(skip(self), fields(site = %self.name))]
    async fn get_resource_files(&self, id: &str) -> Result<Vec<SiteFile>, SiteError> {
        let parsed = Identifier::parse(id);
        if !parsed.is_resource() {
            return Err(SiteError::invalid(id, "not a resource id"));
        }
        let urls = parsed.get_all("url");
        if urls.is_empty() {
            return Err(SiteError::invalid(id, "resource has no url"));
        }
        urls.into_iter()
            .map(|url| file_from_url(self.member_id(url), url, None, 0))
            .collect()
    }

    async fn get_resource(&self, id: &str) -> Result<SiteResource, SiteError> {
        let parsed = Identifier::parse(id);
        if !parsed.is_resource() {
            return Err(SiteError::invalid(id, "not a resource id"));
        }
        let first_name = parsed
            .get("url")
            .and_then(|url| Url::parse(url).ok())
            .and_then(|url| filename_from_url(&url))
            .unwrap_or_default();
        let title = parsed
            .get("title")
            .map(str::to_string)
            .unwrap_or(first_name);
        Ok(SiteResource {
            id: id.to_string(),
            number: parsed.get("number").unwrap_or_default().to_string(),
            title,
            author: parsed.get("author").unwrap_or_default().to_string(),
            size: parsed.get("size").and_then(|s| s.parse().ok()).unwrap_or(0),
            tags: parsed.get_all("tag").into_iter().map(str::to_string).collect(),
        })
    }
}
