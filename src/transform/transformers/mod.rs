//! Built-in transformers.
//!
//! | Name            | Effect                                                  |
//! |-----------------|---------------------------------------------------------|
//! | `decensorship`  | restore disguised extensions (`.r_a_r`, `.mp42`, ...)   |
//! | `correctext`    | fix archive extensions from file signatures             |
//! | `text`          | `.txt` to LF line endings, BOM per option               |
//! | `nocredit`      | delete known publisher credit files                     |
//! | `denesting`     | collapse single-subdirectory chains                     |
//! | `wav`           | convert `.wav` to `.flac`                               |
//! | `noempty`       | reject directories with too little content              |
//! | `normalizename` | clean every entry name                                  |
//! | `clean`         | delete OS junk and orphaned `.aria2` files              |

mod cleanup;
mod denesting;
mod media;
mod rename;

pub use cleanup::{Clean, NoCredit, NoEmpty};
pub use denesting::Denesting;
pub use media::{text, wav};
pub use rename::{CorrectExt, Decensorship, NormalizeName};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::{TransformError, Transformer, is_hidden};

/// Archive extensions recognized by signature.
pub const ARCHIVE_EXTS: &[&str] = &[".rar", ".zip", ".7z"];

/// Every built-in transformer.
#[must_use]
pub fn builtin() -> Vec<Arc<dyn Transformer>> {
    vec![
        Arc::new(Decensorship),
        Arc::new(CorrectExt),
        Arc::new(text()),
        Arc::new(NoCredit),
        Arc::new(Denesting),
        Arc::new(wav()),
        Arc::new(NoEmpty),
        Arc::new(NormalizeName),
        Arc::new(Clean),
    ]
}

/// Non-hidden direct children of `dir`, sorted by name.
fn visible_entries(dir: &Path) -> Result<Vec<fs::DirEntry>, TransformError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|source| TransformError::io("read dir", dir, source))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TransformError::io("read dir", dir, source))?;
    entries.retain(|entry| !is_hidden(&entry.file_name()));
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

/// Non-hidden files anywhere below `dir`, hidden directories pruned.
fn visible_files(dir: &Path) -> Result<Vec<PathBuf>, TransformError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry.file_name()));
    for entry in walker {
        let entry = entry.map_err(|source| TransformError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
