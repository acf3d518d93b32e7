//! TOML-backed application configuration.
//!
//! One [`Config`] value is loaded at startup and passed explicitly into the
//! registry, the clients and the commands; nothing reads configuration from
//! ambient state afterwards.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

/// Name of the built-in client backed by `aria2_url` / `save_path`.
pub const LOCAL_CLIENT: &str = "local";

/// Default aria2 JSON-RPC endpoint of the built-in client.
pub const DEFAULT_ARIA2_URL: &str = "http://localhost:6800/jsonrpc";

const CONFIG_DIR_NAME: &str = "mediadl";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "data.db";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Two clients or two sites share a name.
    #[error("invalid config: duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// A client or site has no name.
    #[error("invalid config: {kind} entry #{index} has an empty name")]
    EmptyName { kind: &'static str, index: usize },
}

/// One configured download client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub name: String,
    /// Client implementation, e.g. `aria2`.
    #[serde(rename = "type")]
    pub kind: String,
    /// RPC endpoint.
    pub url: String,
    /// RPC secret.
    pub token: String,
    /// Default save directory on the client's filesystem.
    pub save_path: String,
    /// The client shares this machine's filesystem.
    pub local: bool,
    /// The client uses `\` as its path separator.
    pub windows: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "aria2".to_string(),
            url: String::new(),
            token: String::new(),
            save_path: String::new(),
            local: false,
            windows: false,
        }
    }
}

/// One configured site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    /// Site implementation, e.g. `direct`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// A cookie forwarded to the download client for matching hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Host the cookie applies to; a leading dot is ignored.
    pub domain: String,
    pub name: String,
    pub value: String,
}

impl CookieConfig {
    fn matches(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Save path of the built-in `local` client.
    pub save_path: String,
    /// Endpoint of the built-in `local` client.
    pub aria2_url: String,
    /// Secret of the built-in `local` client.
    pub aria2_token: String,
    /// Per-download `user-agent` sent to the client.
    pub user_agent: String,
    /// Archive passwords handed to transformers.
    pub passwords: Vec<String>,
    /// Database file; defaults to `data.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    pub clients: Vec<ClientConfig>,
    pub sites: Vec<SiteConfig>,
    pub cookies: Vec<CookieConfig>,
    /// File this config was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let save_path = env_var_non_empty_os("HOME")
            .map(|home| PathBuf::from(home).join("Downloads"))
            .unwrap_or_else(|| PathBuf::from("Downloads"));
        Self {
            save_path: save_path.to_string_lossy().into_owned(),
            aria2_url: DEFAULT_ARIA2_URL.to_string(),
            aria2_token: String::new(),
            user_agent: String::new(),
            passwords: Vec::new(),
            database: None,
            clients: Vec::new(),
            sites: Vec::new(),
            cookies: Vec::new(),
            source: None,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read,
    /// parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(resolve_default_config_path);
        let Some(path) = path else {
            debug!("No config path could be resolved, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self {
                source: Some(path),
                ..Self::default()
            });
        }
        info!(path = %path.display(), "Loading config file");
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.source = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or a validation error.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects empty and duplicate client/site names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyName`] or [`ConfigError::DuplicateName`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_names("client", self.clients.iter().map(|c| c.name.as_str()))?;
        check_names("site", self.sites.iter().map(|s| s.name.as_str()))?;
        Ok(())
    }

    /// Database file location.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        if let Some(database) = &self.database {
            return database.clone();
        }
        match self.source.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(DATABASE_FILE_NAME),
            None => PathBuf::from(DATABASE_FILE_NAME),
        }
    }

    /// Configuration of the built-in `local` client.
    #[must_use]
    pub fn local_client(&self) -> ClientConfig {
        ClientConfig {
            name: LOCAL_CLIENT.to_string(),
            kind: "aria2".to_string(),
            url: self.aria2_url.clone(),
            token: self.aria2_token.clone(),
            save_path: self.save_path.clone(),
            local: true,
            windows: cfg!(windows),
        }
    }

    /// All client configurations; a configured client named `local`
    /// replaces the built-in one.
    #[must_use]
    pub fn client_configs(&self) -> Vec<ClientConfig> {
        let mut clients = self.clients.clone();
        if !clients.iter().any(|c| c.name == LOCAL_CLIENT) {
            clients.push(self.local_client());
        }
        clients
    }

    /// `Cookie` header value for `url`: the first cookie whose domain
    /// matches the URL host exactly or as a dot-suffix.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        cookie_header(&self.cookies, url)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when a value cannot be represented.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// `Cookie` header value for `url` from `cookies`; see [`Config::cookie_header`].
#[must_use]
pub fn cookie_header(cookies: &[CookieConfig], url: &Url) -> Option<String> {
    let host = url.host_str()?;
    cookies
        .iter()
        .find(|cookie| cookie.matches(host))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
}

fn check_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, name) in names.enumerate() {
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName { kind, index });
        }
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediadl/config.toml`
/// 2. `$HOME/.config/mediadl/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
