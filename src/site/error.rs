//! Error types for site lookups.

use thiserror::Error;

/// Errors returned while resolving identifiers through a [`Site`](super::Site).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    /// The identifier carries no `site` field.
    #[error("id {id:?} has no site")]
    MissingSite { id: String },

    /// No site with this name is registered.
    #[error("site {name} not found")]
    UnknownSite { name: String },

    /// The identifier is not usable by this site.
    #[error("invalid id {id:?}: {reason}")]
    InvalidIdentifier { id: String, reason: String },

    /// The site has no object with this id.
    #[error("{id:?} not found on site")]
    NotFound { id: String },

    /// A file resolved, but without a download URL.
    #[error("file {id:?} no url found")]
    NoUrl { id: String },
}

impl SiteError {
    /// Creates an invalid-identifier error.
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// `true` for errors that retrying cannot fix.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingSite { .. } | Self::UnknownSite { .. } | Self::InvalidIdentifier { .. }
        )
    }
}
