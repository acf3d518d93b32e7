//! Per-file rewrite helper shared by content and binary transformers.
//!
//! A [`FileRewriter`] walks the non-hidden files of the target directory,
//! produces a rewritten copy of each matching file inside [`TMP_DIR`], and
//! then swaps it in:
//!
//! - same name: the copy replaces the original in place;
//! - new name (e.g. `.wav` -> `.flac`): the copy is moved next to the
//!   original, companion files follow the rename, and the original is removed;
//! - option `backup=1`: the original is moved into the backup dir first.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

use super::{TMP_DIR, TransformContext, TransformError, Transformer, is_hidden, move_path};
use crate::naming::{extension, new_file_path, path_exists};

/// Replaced by the input file path in binary arguments.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";

/// Replaced by the output file path in binary arguments.
pub const OUTPUT_PLACEHOLDER: &str = "{{output}}";

const MAX_BINARY_ATTEMPTS: u32 = 3;

/// Rewrites file contents; `Ok(None)` means the file is already normalized.
pub type ContentsFn =
    fn(&[u8], &Path, &mut TransformContext) -> Result<Option<Vec<u8>>, TransformError>;

/// Decides what to do after a failed binary run, given its combined output.
pub type OnErrorFn = fn(&str, &mut TransformContext) -> ErrorAction;

/// Reaction to a failed binary run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAction {
    /// Run again with these arguments.
    Retry(Vec<String>),
    /// Leave this file untouched and go on.
    Skip,
    /// Abort the transformer.
    Fail,
}

/// An external program invoked once per file.
#[derive(Debug, Clone)]
pub struct BinaryCommand {
    /// Program name; the `{binary}_binary` option overrides it.
    pub binary: &'static str,
    /// Arguments containing [`INPUT_PLACEHOLDER`] and [`OUTPUT_PLACEHOLDER`].
    pub args: Vec<String>,
    pub on_error: Option<OnErrorFn>,
    /// Hand the program a hard link with a plain ASCII name instead of the
    /// original path.
    pub hardlink: bool,
}

/// How a matching file is rewritten.
#[derive(Debug, Clone)]
pub enum Rewrite {
    Contents(ContentsFn),
    Binary(BinaryCommand),
}

/// A [`Transformer`] that rewrites matching files one by one.
#[derive(Debug, Clone)]
pub struct FileRewriter {
    pub name: &'static str,
    /// Extensions (with dot, case-sensitive) to process; empty means all.
    pub exts: &'static [&'static str],
    pub min_size: u64,
    pub max_size: Option<u64>,
    /// Output extension; `None` keeps the filename.
    pub new_ext: Option<&'static str>,
    /// Suffixes of companion files renamed along with a renamed output
    /// (`a.wav.vtt` -> `a.flac.vtt`).
    pub companion_suffixes: &'static [&'static str],
    pub rewrite: Rewrite,
}

/// Removes the scratch dir on drop.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn create(path: PathBuf) -> Result<Self, TransformError> {
        if path_exists(&path) {
            fs::remove_dir_all(&path)
                .map_err(|source| TransformError::io("clean tmp dir", &path, source))?;
        }
        fs::create_dir_all(&path)
            .map_err(|source| TransformError::io("create tmp dir", &path, source))?;
        Ok(Self(path))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

impl Transformer for FileRewriter {
    fn name(&self) -> &str {
        self.name
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let binary = match &self.rewrite {
            Rewrite::Binary(command) => Some(resolve_binary(command.binary, ctx)?),
            Rewrite::Contents(_) => None,
        };
        let scratch = ScratchDir::create(ctx.dir().join(TMP_DIR))?;
        let mut changed = false;
        for path in self.candidates(ctx)? {
            if self.rewrite_file(ctx, &path, &scratch.0, binary.as_deref())? {
                changed = true;
            }
        }
        Ok(changed)
    }
}

impl FileRewriter {
    /// Non-hidden files under the target dir matching the extension and size filters.
    fn candidates(&self, ctx: &mut TransformContext) -> Result<Vec<PathBuf>, TransformError> {
        let root = ctx.dir().to_path_buf();
        let mut files = Vec::new();
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.file_name()));
        for entry in walker {
            let entry = entry.map_err(|source| TransformError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.exts.is_empty() && !self.exts.contains(&extension(&name)) {
                continue;
            }
            let size = entry
                .metadata()
                .map_err(|source| TransformError::Walk {
                    path: entry.path().to_path_buf(),
                    source,
                })?
                .len();
            if self.max_size.is_some_and(|max| size > max) {
                ctx.log(format!("skip file {:?} which is too large", entry.path()));
                continue;
            }
            if size < self.min_size {
                ctx.log(format!("skip file {:?} which is too small", entry.path()));
                continue;
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }

    fn rewrite_file(
        &self,
        ctx: &mut TransformContext,
        path: &Path,
        scratch: &Path,
        binary: Option<&Path>,
    ) -> Result<bool, TransformError> {
        let Some(basename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(false);
        };
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let ext = extension(&basename);
        let base = &basename[..basename.len() - ext.len()];
        let target_name = match self.new_ext {
            Some(new_ext) => format!("{base}{new_ext}"),
            None => basename.clone(),
        };
        let target = dir.join(&target_name);
        let temp = scratch.join(&target_name);
        if target_name != basename && path_exists(&target) {
            ctx.log(format!("Skip {path:?} due to target file {target:?} already exists"));
            return Ok(false);
        }
        remove_if_exists(&temp)?;

        match &self.rewrite {
            Rewrite::Contents(rewrite) => {
                ctx.log(format!("Execute contents rewrite on {path:?}"));
                let input = fs::read(path).map_err(|source| TransformError::io("read", path, source))?;
                let Some(output) = rewrite(&input, path, ctx)? else {
                    return Ok(false);
                };
                fs::write(&temp, output).map_err(|source| TransformError::io("write", &temp, source))?;
            }
            Rewrite::Binary(command) => {
                let Some(binary) = binary else {
                    return Err(TransformError::BinaryNotFound(command.binary.to_string()));
                };
                let input = if command.hardlink {
                    let link = new_file_path(scratch, &format!("input{ext}"));
                    fs::hard_link(path, &link)
                        .map_err(|source| TransformError::io("hard link", &link, source))?;
                    link
                } else {
                    path.to_path_buf()
                };
                if !run_binary(ctx, binary, command, &input, &temp)? {
                    return Ok(false);
                }
            }
        }

        if ctx.options().flag("backup") {
            let backup = new_file_path(ctx.backup_dir(), &basename);
            move_path(path, &backup)?;
            move_path(&temp, &target)?;
        } else if target_name != basename {
            move_path(&temp, &target)?;
            for suffix in self.companion_suffixes {
                let old = dir.join(format!("{basename}{suffix}"));
                let new = dir.join(format!("{target_name}{suffix}"));
                if path_exists(&old) && !path_exists(&new) {
                    if let Err(err) = move_path(&old, &new) {
                        ctx.log(format!("! failed to rename {old:?} => {new:?}: {err}"));
                    }
                }
            }
            fs::remove_file(path).map_err(|source| TransformError::io("remove", path, source))?;
        } else {
            move_path(&temp, &target)?;
        }
        Ok(true)
    }
}

fn resolve_binary(name: &str, ctx: &TransformContext) -> Result<PathBuf, TransformError> {
    let custom = ctx.options().get(&format!("{name}_binary"));
    let wanted = if custom.is_empty() { name } else { custom };
    which::which(wanted).map_err(|_| TransformError::BinaryNotFound(wanted.to_string()))
}

fn remove_if_exists(path: &Path) -> Result<(), TransformError> {
    if path_exists(path) {
        fs::remove_file(path).map_err(|source| TransformError::io("remove", path, source))?;
    }
    Ok(())
}

/// Runs `command` until it produces `output`. Returns `false` when the
/// error policy asked to skip this file.
fn run_binary(
    ctx: &mut TransformContext,
    binary: &Path,
    command: &BinaryCommand,
    input: &Path,
    output: &Path,
) -> Result<bool, TransformError> {
    let mut args = command.args.clone();
    for _ in 0..MAX_BINARY_ATTEMPTS {
        remove_if_exists(output)?;
        let resolved: Vec<String> = args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.to_string_lossy().into_owned(),
                OUTPUT_PLACEHOLDER => output.to_string_lossy().into_owned(),
                other => other.to_string(),
            })
            .collect();
        ctx.log(format!("Execute binary {binary:?} {resolved:?}"));
        let result = Command::new(binary)
            .args(&resolved)
            .output()
            .map_err(|source| TransformError::io("execute", binary, source))?;
        let mut combined = String::from_utf8_lossy(&result.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&result.stderr));

        let reason = if !result.status.success() {
            format!("exit status {}", result.status)
        } else if !path_exists(output) {
            TransformError::NoOutputFile.to_string()
        } else {
            ctx.log("Success executed");
            return Ok(true);
        };
        let Some(on_error) = command.on_error else {
            ctx.log(format!("Binary process exited with error: {reason}"));
            return Err(TransformError::Binary {
                binary: binary.to_string_lossy().into_owned(),
                reason,
            });
        };
        match on_error(&combined, ctx) {
            ErrorAction::Retry(new_args) => args = new_args,
            ErrorAction::Skip => return Ok(false),
            ErrorAction::Fail => {
                ctx.log(format!("Binary process failed: {reason}"));
                return Err(TransformError::Binary {
                    binary: binary.to_string_lossy().into_owned(),
                    reason,
                });
            }
        }
    }
    Err(TransformError::TooManyFails)
}
