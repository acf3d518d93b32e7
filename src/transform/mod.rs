//! Directory transform pipeline.
//!
//! A [`Pipeline`] is an ordered list of steps; each step runs one or more
//! [`Transformer`]s against a directory, repeating until the last
//! transformer of the step reports no change. Transformers must be
//! idempotent: a second run with no outside change returns `Ok(false)`.
//!
//! # Overview
//!
//! - [`Transformer`] - one named, idempotent directory rewrite
//! - [`Pipeline`] / [`Step`] - parsed step list with repeat counts
//! - [`TransformContext`] - per-run state, backup dir and log
//! - [`TransformerRegistry`] - transformer name lookup
//!
//! # Example
//!
//! ```ignore
//! use mediadl_core::transform::{Pipeline, TransformOptions, TransformerRegistry};
//!
//! let registry = TransformerRegistry::with_builtin();
//! let pipeline = Pipeline::parse(&["decensorship,text", "-1", "clean"], &registry)?;
//! let ctx = pipeline.transform(dir, &TransformOptions::new());
//! ```

mod context;
mod error;
pub mod executor;
mod options;
mod pipeline;
pub mod transformers;

pub use context::TransformContext;
pub use error::TransformError;
pub use options::TransformOptions;
pub use pipeline::{Pipeline, Repeat, Step};

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Safety cap on passes of one step.
pub const MAX_TIMES: u32 = 10;

/// Scratch directory created inside the target directory.
pub const TMP_DIR: &str = ".tftmp";

/// Default backup directory inside the target directory.
pub const BAK_DIR: &str = ".bak";

/// Append-only log inside the backup directory.
pub const LOG_FILE: &str = ".tflog";

/// Prefix of a directory locked for processing.
pub const TF_PREFIX: &str = ".tf.";

/// Option overriding the backup directory.
pub const BAKDIR_OPTION: &str = "bakdir";

/// The default normalize pipeline, with `wav` in its slot.
pub const DEFAULT_PIPELINE: &[&str] = &[
    "decensorship,correctext,text,nocredit,denesting",
    "-1",
    "wav",
    "noempty",
    "normalizename",
    "clean",
];

/// One named, idempotent directory rewrite.
///
/// Returns `Ok(true)` when the filesystem was modified.
pub trait Transformer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Runs against `ctx.dir()`.
    ///
    /// # Errors
    ///
    /// Any error aborts the pipeline.
    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError>;
}

/// Name → transformer table.
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    transformers: BTreeMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in transformer.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for transformer in transformers::builtin() {
            registry.register(transformer);
        }
        registry
    }

    /// Adds (or replaces) a transformer under its own name.
    pub fn register(&mut self, transformer: Arc<dyn Transformer>) {
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    /// Looks up a transformer.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::UnknownTransformer`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Transformer>, TransformError> {
        self.transformers
            .get(name)
            .cloned()
            .ok_or_else(|| TransformError::UnknownTransformer(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transformers.keys().map(String::as_str)
    }
}

/// `true` for dot-files and dot-dirs, which every transformer leaves alone.
pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Renames `from` to `to`, replacing a file at `to`. Falls back to
/// copy-and-delete for files on different filesystems.
pub(crate) fn move_path(from: &Path, to: &Path) -> Result<(), TransformError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices && from.is_file() => {
            fs::copy(from, to).map_err(|source| TransformError::io("copy", to, source))?;
            fs::remove_file(from).map_err(|source| TransformError::io("remove", from, source))
        }
        Err(source) => Err(TransformError::io("rename", from, source)),
    }
}
