//! Query-string identifiers: `site=NAME&type=resource&...`.
//!
//! An identifier may carry transient access fields (password, token) next to
//! the permanent locator; [`stable_identifier`] strips them so the same object
//! always dedups to the same key.

use url::form_urlencoded;

use super::SiteError;

/// Fields that may change without the object changing.
pub const TRANSIENT_FIELDS: [&str; 3] = ["password", "token", "auth"];

/// A parsed identifier, keeping field order and repeated keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl Identifier {
    /// Parses `raw` as a query string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let pairs = form_urlencoded::parse(raw.trim_start_matches('?').as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            raw: raw.to_string(),
            pairs,
        }
    }

    /// The original string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `key`, in order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The required `site` field.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError::MissingSite`] when it is absent or empty.
    pub fn site(&self) -> Result<&str, SiteError> {
        match self.get("site") {
            Some(site) if !site.is_empty() => Ok(site),
            _ => Err(SiteError::MissingSite {
                id: self.raw.clone(),
            }),
        }
    }

    /// `true` when `type=resource`.
    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.get("type") == Some("resource")
    }

    /// Permanent form: transient fields dropped, remaining pairs sorted.
    #[must_use]
    pub fn stable(&self) -> String {
        let mut pairs: Vec<&(String, String)> = self
            .pairs
            .iter()
            .filter(|(k, _)| !TRANSIENT_FIELDS.contains(&k.as_str()))
            .collect();
        pairs.sort();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

/// Builds an identifier string from pairs, in order.
#[must_use]
pub fn build_identifier<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

/// Shorthand for `Identifier::parse(id).stable()`.
#[must_use]
pub fn stable_identifier(id: &str) -> String {
    Identifier::parse(id).stable()
}
