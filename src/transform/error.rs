//! Transform pipeline error types.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while building or running a transform pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Directory contents are unusable (e.g. too small). Callers treat this
    /// as a soft failure: the directory stays as it is, backups included.
    #[error("invalid contents")]
    InvalidContents,

    /// A step kept reporting changes past the safety cap.
    #[error("loop too many times")]
    LoopTooManyTimes,

    #[error("{operation} {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to open log file: {source}")]
    LogOpen {
        #[source]
        source: io::Error,
    },

    #[error("failed to rename {from:?} => {to:?}: target already exists")]
    TargetExists { from: PathBuf, to: PathBuf },

    #[error("transformer {0} not exists")]
    UnknownTransformer(String),

    #[error("invalid arg {arg}: {reason}")]
    InvalidStep { arg: String, reason: &'static str },

    #[error("no transformers")]
    EmptyPipeline,

    #[error("binary {0:?} not found")]
    BinaryNotFound(String),

    /// The external binary failed and no retry applied.
    #[error("binary {binary:?} failed: {reason}")]
    Binary { binary: String, reason: String },

    #[error("no target output file exists")]
    NoOutputFile,

    #[error("too many fails")]
    TooManyFails,

    /// Failure of one named transformer; aborts the whole pipeline.
    #[error("[transformer {name}]{source}")]
    Transformer {
        name: String,
        #[source]
        source: Box<TransformError>,
    },
}

impl TransformError {
    /// Builds an [`TransformError::Io`] for `path`.
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// `true` for [`TransformError::InvalidContents`], directly or wrapped.
    #[must_use]
    pub fn is_invalid_contents(&self) -> bool {
        match self {
            Self::InvalidContents => true,
            Self::Transformer { source, .. } => source.is_invalid_contents(),
            _ => false,
        }
    }
}
