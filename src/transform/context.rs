use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{BAK_DIR, BAKDIR_OPTION, LOG_FILE, TransformError, TransformOptions};

/// State of one pipeline run against one directory.
///
/// `changed` only ever goes from `false` to `true`. The log file is open
/// between [`TransformContext::open_log`] and [`TransformContext::close_log`].
#[derive(Debug)]
pub struct TransformContext {
    dir: PathBuf,
    backup_dir: PathBuf,
    options: TransformOptions,
    changed: bool,
    err: Option<TransformError>,
    current: Option<String>,
    log: Option<File>,
}

impl TransformContext {
    /// Context for `dir`; the backup dir is the `bakdir` option or `dir/.bak`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, options: TransformOptions) -> Self {
        let dir = dir.into();
        let backup_dir = match options.get(BAKDIR_OPTION) {
            "" => dir.join(BAK_DIR),
            bakdir => PathBuf::from(bakdir),
        };
        Self {
            dir,
            backup_dir,
            options,
            changed: false,
            err: None,
            current: None,
            log: None,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    #[must_use]
    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Whether any transformer modified the directory.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// The error that ended the run, if any.
    #[must_use]
    pub fn err(&self) -> Option<&TransformError> {
        self.err.as_ref()
    }

    /// Consumes the context, returning its error.
    #[must_use]
    pub fn into_err(self) -> Option<TransformError> {
        self.err
    }

    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub(crate) fn fail(&mut self, err: TransformError) {
        self.err = Some(err);
    }

    pub(crate) fn set_current(&mut self, name: Option<&str>) {
        self.current = name.map(str::to_string);
    }

    /// Creates the backup dir and opens the append-only log inside it.
    pub(crate) fn open_log(&mut self) -> Result<(), TransformError> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|source| TransformError::io("create backup dir", &self.backup_dir, source))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.backup_dir.join(LOG_FILE))
            .map_err(|source| TransformError::LogOpen { source })?;
        self.log = Some(file);
        Ok(())
    }

    pub(crate) fn close_log(&mut self) {
        if let Some(mut file) = self.log.take() {
            let _ = file.flush();
        }
    }

    /// Writes one log line, prefixed with the running transformer's name.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let mut line = String::new();
        if let Some(name) = &self.current {
            line.push_str("[Transformer ");
            line.push_str(name);
            line.push(']');
        }
        line.push_str(message.as_ref());
        trace!("{line}");
        if let Some(file) = self.log.as_mut() {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if let Err(err) = file.write_all(line.as_bytes()) {
                debug!(error = %err, "Failed to write transform log");
            }
        }
    }
}
