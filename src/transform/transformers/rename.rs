//! Renaming transformers: extension fixes and name cleaning.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::{ARCHIVE_EXTS, visible_entries, visible_files};
use crate::naming::{clean_basename, clean_file_basename, extension, path_exists};
use crate::transform::{TransformContext, TransformError, Transformer, move_path};

/// Bytes read for signature sniffing.
const HEADER_SIZE: u64 = 512 * 1024;

/// Disguised extensions mapped back to the real one, after lowercasing
/// and removing `_` / `-`.
const EXT_MAP: &[(&str, &str)] = &[(".rar2", ".rar"), (".zip2", ".rar"), (".mp42", ".mp4")];

/// Restores extensions altered to dodge online previews (`.r_a_r`,
/// `.MP4-2`, ...) and lowercases every extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decensorship;

fn restored_ext(ext: &str) -> String {
    let ext: String = ext
        .to_lowercase()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect();
    EXT_MAP
        .iter()
        .find(|(from, _)| *from == ext)
        .map_or(ext, |(_, to)| (*to).to_string())
}

impl Transformer for Decensorship {
    fn name(&self) -> &str {
        "decensorship"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let mut changed = false;
        for path in visible_files(ctx.dir())? {
            let name = file_name(&path);
            let ext = extension(&name);
            let new_ext = restored_ext(ext);
            if ext == new_ext {
                continue;
            }
            let new_path = path.with_file_name(format!("{}{new_ext}", &name[..name.len() - ext.len()]));
            ctx.log(format!("rename {path:?} to {new_path:?}"));
            let same_entry = cfg!(windows)
                && path
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&new_path.to_string_lossy());
            if !same_entry && path_exists(&new_path) {
                return Err(TransformError::TargetExists {
                    from: path,
                    to: new_path,
                });
            }
            move_path(&path, &new_path)?;
            changed = true;
        }
        Ok(changed)
    }
}

/// Renames top-level archives whose signature says they are a different
/// archive type (a `.zip` that is really a `.rar`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectExt;

fn read_header(path: &Path) -> Result<Vec<u8>, TransformError> {
    let file = File::open(path).map_err(|source| TransformError::io("open", path, source))?;
    let mut header = Vec::new();
    file.take(HEADER_SIZE)
        .read_to_end(&mut header)
        .map_err(|source| TransformError::io("read", path, source))?;
    Ok(header)
}

impl Transformer for CorrectExt {
    fn name(&self) -> &str {
        "correctext"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let mut changed = false;
        for entry in visible_entries(ctx.dir())? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let name = file_name(&path);
            let ext = extension(&name);
            if !ARCHIVE_EXTS.contains(&ext) {
                continue;
            }
            let header = read_header(&path)?;
            let Some(kind) = infer::get(&header) else {
                continue;
            };
            let detected = format!(".{}", kind.extension().to_lowercase());
            if !ARCHIVE_EXTS.contains(&detected.as_str()) || detected.eq_ignore_ascii_case(ext) {
                continue;
            }
            let new_path = path.with_file_name(format!("{}{detected}", &name[..name.len() - ext.len()]));
            if path_exists(&new_path) {
                return Err(TransformError::TargetExists {
                    from: path,
                    to: new_path,
                });
            }
            move_path(&path, &new_path)?;
            ctx.log(format!("renamed {path:?} => {new_path:?}"));
            changed = true;
        }
        Ok(changed)
    }
}

/// Recursively renames every non-hidden entry to a cleaned basename.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeName;

impl Transformer for NormalizeName {
    fn name(&self) -> &str {
        "normalizename"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let mut pending: Vec<PathBuf> = visible_entries(ctx.dir())?
            .iter()
            .map(std::fs::DirEntry::path)
            .collect();
        let mut renamed = 0usize;
        while let Some(mut path) = pending.pop() {
            let is_dir = path.is_dir();
            let name = file_name(&path);
            let cleaned = if is_dir {
                clean_basename(&name)
            } else {
                clean_file_basename(&name)
            };
            if !cleaned.is_empty() && cleaned != name {
                let new_path = path.with_file_name(&cleaned);
                if path_exists(&new_path) {
                    return Err(TransformError::TargetExists {
                        from: path,
                        to: new_path,
                    });
                }
                move_path(&path, &new_path)?;
                ctx.log(format!("{path:?} => {cleaned:?}"));
                renamed += 1;
                path = new_path;
            }
            if is_dir {
                pending.extend(visible_entries(&path)?.iter().map(std::fs::DirEntry::path));
            }
        }
        Ok(renamed > 0)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
