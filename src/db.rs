//! SQLite storage for the queue.
//!
//! The queue lives in a single file next to the config file. The watch loop,
//! the stdin control listener and one-shot commands all open it at the same
//! time, so file databases run in WAL mode with a busy timeout.
//!
//! ```no_run
//! use mediadl_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("data.db")).await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size for file databases; SQLite serializes writers anyway.
const MAX_CONNECTIONS: u32 = 5;

/// How long a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pooled handle to the queue database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database file at `db_path` and applies
    /// pending migrations. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::CreateDir`] if the parent directory cannot be
    /// created, [`DbError::Connection`] if SQLite refuses the file, or
    /// [`DbError::Migration`] if the schema cannot be brought up to date.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database, used by tests.
    ///
    /// The pool holds exactly one connection that never expires, since the
    /// data disappears with it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] or [`DbError::Migration`].
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        MIGRATOR.run(&pool).await?;
        debug!(migrations = MIGRATOR.iter().count(), "Schema up to date");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current journal mode as reported by SQLite, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Connection`] if the pragma query fails.
    pub async fn journal_mode(&self) -> Result<String, DbError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_lowercase())
    }

    /// Closes every pooled connection; later queries on clones fail.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn insert(db: &Database, sql: &str) -> Result<(), sqlx::Error> {
        sqlx::query(sql).execute(db.pool()).await.map(|_| ())
    }

    #[tokio::test]
    async fn test_in_memory_schema_has_both_tables() {
        let db = Database::new_in_memory().await.unwrap();

        insert(
            &db,
            "INSERT INTO file_downloads (file_id, filename, status) VALUES ('site=a&url=x', 'x.rar', '')",
        )
        .await
        .unwrap();
        insert(
            &db,
            "INSERT INTO resource_downloads (resource_id, site, status) VALUES ('site=a&type=resource', 'a', 'skip')",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = Database::new(&temp_dir.path().join("data.db")).await.unwrap();

        assert_eq!(db.journal_mode().await.unwrap(), "wal");
    }

    #[tokio::test]
    async fn test_missing_parent_dirs_are_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("config").join("data.db");

        Database::new(&db_path).await.unwrap();

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_reopening_keeps_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("data.db");
        let db = Database::new(&db_path).await.unwrap();
        insert(&db, "INSERT INTO file_downloads (file_id) VALUES ('site=a&url=x')")
            .await
            .unwrap();
        db.close().await;

        let db = Database::new(&db_path).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_downloads")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_file_status_check_rejects_skip() {
        let db = Database::new_in_memory().await.unwrap();

        // "skip" is only valid for resources
        let result = insert(&db, "INSERT INTO file_downloads (status) VALUES ('skip')").await;

        assert!(result.is_err());
    }
}
