//! Conditional filters for finding queue rows.
//!
//! Filters translate into `WHERE` clauses with bound parameters; every field
//! left as `None` is not constrained.

use sqlx::{QueryBuilder, Sqlite};

use super::item::{FileStatus, ResourceStatus};

/// Filter over `file_downloads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    pub client: Option<String>,
    pub statuses: Vec<FileStatus>,
    pub resource_id: Option<String>,
    pub download_id: Option<String>,
    pub site: Option<String>,
    pub identifier: Option<String>,
}

impl FileFilter {
    /// Matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows owned by `client`.
    #[must_use]
    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Rows with `status` (repeatable: statuses are OR-ed).
    #[must_use]
    pub fn status(mut self, status: FileStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Rows belonging to the resource `resource_id`.
    #[must_use]
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Rows not belonging to any resource.
    #[must_use]
    pub fn standalone(self) -> Self {
        self.resource("")
    }

    /// The row tracking client task `download_id`.
    #[must_use]
    pub fn download_id(mut self, download_id: impl Into<String>) -> Self {
        self.download_id = Some(download_id.into());
        self
    }

    /// Rows with the stable identifier `identifier` on `site`.
    #[must_use]
    pub fn identifier(mut self, site: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self.identifier = Some(identifier.into());
        self
    }

    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        push_eq(qb, "client", self.client.as_ref());
        push_eq(qb, "resource_id", self.resource_id.as_ref());
        push_eq(qb, "download_id", self.download_id.as_ref());
        push_eq(qb, "site", self.site.as_ref());
        push_eq(qb, "identifier", self.identifier.as_ref());
        push_in(qb, self.statuses.iter().map(FileStatus::as_str));
    }
}

/// Filter over `resource_downloads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub client: Option<String>,
    pub statuses: Vec<ResourceStatus>,
    pub site: Option<String>,
    pub identifier: Option<String>,
}

impl ResourceFilter {
    /// Matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows owned by `client`.
    #[must_use]
    pub fn client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Rows with `status` (repeatable: statuses are OR-ed).
    #[must_use]
    pub fn status(mut self, status: ResourceStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Rows with the stable identifier `identifier` on `site`.
    #[must_use]
    pub fn identifier(mut self, site: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self.identifier = Some(identifier.into());
        self
    }

    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        push_eq(qb, "client", self.client.as_ref());
        push_eq(qb, "site", self.site.as_ref());
        push_eq(qb, "identifier", self.identifier.as_ref());
        push_in(qb, self.statuses.iter().map(ResourceStatus::as_str));
    }
}

fn push_eq(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, value: Option<&String>) {
    if let Some(value) = value {
        qb.push(format!(" AND {column} = "));
        qb.push_bind(value.clone());
    }
}

fn push_in<'a>(qb: &mut QueryBuilder<'_, Sqlite>, statuses: impl Iterator<Item = &'a str>) {
    let statuses: Vec<&str> = statuses.collect();
    if statuses.is_empty() {
        return;
    }
    qb.push(" AND status IN (");
    let mut separated = qb.separated(", ");
    for status in statuses {
        separated.push_bind(status.to_string());
    }
    separated.push_unseparated(")");
}
