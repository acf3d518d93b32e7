//! Error types for queue operations on file and resource download rows.

use std::fmt;

use thiserror::Error;

/// Coarse classification of a failed database call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDbErrorKind {
    /// Another connection holds the write lock, or the pool had no free
    /// connection in time. Retrying later usually succeeds.
    Busy,
    /// A CHECK / UNIQUE / NOT NULL constraint rejected the write.
    Constraint,
    /// The pool was closed during shutdown.
    Closed,
    Other,
}

impl QueueDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::Busy,
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => Self::Closed,
            sqlx::Error::Database(db) => {
                // SQLITE_BUSY = 5, SQLITE_LOCKED = 6; extended codes keep the
                // primary code in the low byte.
                let primary = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                if matches!(primary, Some(5 | 6)) {
                    Self::Busy
                } else if db.is_check_violation()
                    || db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || primary == Some(19)
                {
                    Self::Constraint
                } else {
                    Self::Other
                }
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for QueueDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::Constraint => "constraint",
            Self::Closed => "closed",
            Self::Other => "other",
        })
    }
}

/// Errors that can occur during queue operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue database error ({kind}): {message}")]
    Database {
        kind: QueueDbErrorKind,
        message: String,
    },

    /// No row with this primary key; it may have been replaced by a re-add.
    #[error("queue row {0} not found")]
    ItemNotFound(i64),

    #[error("invalid status {status:?} stored in queue")]
    InvalidStatus { status: String },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: QueueDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl QueueError {
    #[must_use]
    pub fn invalid_status(status: &str) -> Self {
        Self::InvalidStatus {
            status: status.to_string(),
        }
    }

    /// True when the same call is expected to succeed on a later cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database {
                kind: QueueDbErrorKind::Busy,
                ..
            }
        )
    }
}
