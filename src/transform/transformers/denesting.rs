use std::fs;
use std::path::Path;

use super::visible_entries;
use crate::naming::path_exists;
use crate::transform::{TMP_DIR, TransformContext, TransformError, Transformer, move_path};

/// Collapses `dir/A/B/...` chains where every level holds a single
/// subdirectory, moving the innermost contents up into `dir`.
///
/// Hidden entries (the backup dir, leftover scratch) do not count as
/// content; the original chain is parked as `.orig.NAME` while its
/// contents move and is removed afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct Denesting;

impl Transformer for Denesting {
    fn name(&self) -> &str {
        "denesting"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let tmp = ctx.dir().join(TMP_DIR);
        if path_exists(&tmp) {
            fs::remove_dir_all(&tmp).map_err(|source| TransformError::io("remove", &tmp, source))?;
        }
        let entries = visible_entries(ctx.dir())?;
        let [only] = entries.as_slice() else {
            return Ok(false);
        };
        if !only.path().is_dir() {
            return Ok(false);
        }
        let name = only.file_name().to_string_lossy().into_owned();
        ctx.log(format!("denesting dir {name}"));

        let parked = ctx.dir().join(format!(".orig.{name}"));
        move_path(&only.path(), &parked)?;
        let innermost = innermost_dir(&parked)?;
        let children = fs::read_dir(&innermost)
            .map_err(|source| TransformError::io("read dir", &innermost, source))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TransformError::io("read dir", &innermost, source))?;
        for child in children {
            let target = ctx.dir().join(child.file_name());
            if path_exists(&target) {
                return Err(TransformError::TargetExists {
                    from: child.path(),
                    to: target,
                });
            }
            move_path(&child.path(), &target)?;
        }
        fs::remove_dir_all(&parked).map_err(|source| TransformError::io("remove", &parked, source))?;
        Ok(true)
    }
}

/// Follows single-subdirectory links down from `dir`.
fn innermost_dir(dir: &Path) -> Result<std::path::PathBuf, TransformError> {
    let mut current = dir.to_path_buf();
    loop {
        let entries = fs::read_dir(&current)
            .map_err(|source| TransformError::io("read dir", &current, source))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TransformError::io("read dir", &current, source))?;
        match entries.as_slice() {
            [only] if only.path().is_dir() => current = only.path(),
            _ => return Ok(current),
        }
    }
}
