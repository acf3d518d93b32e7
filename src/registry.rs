//! Named download clients and sites, built once at startup.
//!
//! The registry is injected into the watch loop and the admission helper;
//! tests build an empty one and register mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::client::{Aria2Client, ClientError, DownloadClient};
use crate::config::{ClientConfig, Config, SiteConfig};
use crate::site::{DIRECT_SITE_TYPE, DirectSite, Site, SiteError};

/// Client type name of [`Aria2Client`].
pub const ARIA2_CLIENT_TYPE: &str = "aria2";

/// Errors raised while building or querying the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unsupported client type {kind} (client {name})")]
    UnknownClientType { name: String, kind: String },

    #[error("unsupported site type {kind} (site {name})")]
    UnknownSiteType { name: String, kind: String },

    #[error("client {0} not found")]
    UnknownClient(String),

    #[error("failed to create client {name}: {source}")]
    Client {
        name: String,
        #[source]
        source: ClientError,
    },
}

/// Name → capability object tables.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: BTreeMap<String, Arc<dyn DownloadClient>>,
    sites: BTreeMap<String, Arc<dyn Site>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every configured client and site, plus the built-in `local`
    /// client and `direct` site unless the config overrides those names.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on an unknown type or an unusable client config.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for client_config in config.client_configs() {
            let client = create_client(client_config, config)?;
            registry.register_client(client);
        }
        for site_config in &config.sites {
            registry.register_site(create_site(site_config)?);
        }
        if !registry.sites.contains_key(DIRECT_SITE_TYPE) {
            registry.register_site(Arc::new(DirectSite::default()));
        }
        debug!(
            clients = registry.clients.len(),
            sites = registry.sites.len(),
            "Registry built"
        );
        Ok(registry)
    }

    /// Adds (or replaces) a client under its own name.
    pub fn register_client(&mut self, client: Arc<dyn DownloadClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    /// Adds (or replaces) a site under its own name.
    pub fn register_site(&mut self, site: Arc<dyn Site>) {
        self.sites.insert(site.name().to_string(), site);
    }

    /// Looks up a client.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownClient`] when no client has this name.
    pub fn client(&self, name: &str) -> Result<Arc<dyn DownloadClient>, RegistryError> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownClient(name.to_string()))
    }

    /// Looks up a site.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::UnknownSite`] when no site has this name.
    pub fn site(&self, name: &str) -> Result<Arc<dyn Site>, SiteError> {
        self.sites
            .get(name)
            .cloned()
            .ok_or_else(|| SiteError::UnknownSite {
                name: name.to_string(),
            })
    }

    /// Registered client names, sorted.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Registered site names, sorted.
    pub fn site_names(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }
}

fn create_client(
    client_config: ClientConfig,
    config: &Config,
) -> Result<Arc<dyn DownloadClient>, RegistryError> {
    match client_config.kind.as_str() {
        ARIA2_CLIENT_TYPE => {
            let name = client_config.name.clone();
            let client =
                Aria2Client::new(client_config, config.user_agent.clone(), config.cookies.clone())
                    .map_err(|source| RegistryError::Client { name, source })?;
            Ok(Arc::new(client))
        }
        other => Err(RegistryError::UnknownClientType {
            name: client_config.name.clone(),
            kind: other.to_string(),
        }),
    }
}

fn create_site(site_config: &SiteConfig) -> Result<Arc<dyn Site>, RegistryError> {
    match site_config.kind.as_str() {
        DIRECT_SITE_TYPE => Ok(Arc::new(DirectSite::new(&site_config.name))),
        other => Err(RegistryError::UnknownSiteType {
            name: site_config.name.clone(),
            kind: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::LOCAL_CLIENT;

    #[test]
    fn test_from_default_config_has_local_and_direct() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.client_names().collect::<Vec<_>>(), vec![LOCAL_CLIENT]);
        assert_eq!(registry.site_names().collect::<Vec<_>>(), vec![DIRECT_SITE_TYPE]);
        assert!(registry.client(LOCAL_CLIENT).unwrap().config().local);
    }

    #[test]
    fn test_unknown_client_type_rejected() {
        let config = Config::parse("[[clients]]\nname = \"q\"\ntype = \"qbittorrent\"\nurl = \"http://q\"").unwrap();
        let err = Registry::from_config(&config).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownClientType { .. }));
    }

    #[test]
    fn test_unknown_site_type_rejected() {
        let config = Config::parse("[[sites]]\nname = \"s\"\ntype = \"scraper\"").unwrap();
        let err = Registry::from_config(&config).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSiteType { .. }));
    }

    #[test]
    fn test_configured_direct_site_keeps_name() {
        let config = Config::parse("[[sites]]\nname = \"mirror\"\ntype = \"direct\"").unwrap();
        let registry = Registry::from_config(&config).unwrap();
        assert_eq!(registry.site("mirror").unwrap().name(), "mirror");
        assert!(registry.site("direct").is_ok());
    }

    #[test]
    fn test_missing_lookups() {
        let registry = Registry::new();
        assert!(matches!(
            registry.client("x").unwrap_err(),
            RegistryError::UnknownClient(_)
        ));
        assert!(matches!(
            registry.site("x").unwrap_err(),
            SiteError::UnknownSite { .. }
        ));
    }
}
