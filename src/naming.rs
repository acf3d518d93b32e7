//! Filename cleaning and collision-free path resolution.
//!
//! Names coming from sites (titles, authors, remote filenames) are turned into
//! basenames that are valid on every common filesystem. Restricted characters
//! are replaced by their fullwidth look-alikes rather than dropped, so a
//! cleaned name still reads the same to a human.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Maximum basename length in bytes.
pub const FILENAME_MAX_LENGTH: usize = 240;

/// Longest extension (including the dot) preserved by [`clean_file_basename`].
const MAX_PRESERVED_EXT_LEN: usize = 14;

/// Line breaks and tabs collapse into a single space.
#[allow(clippy::expect_used)]
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("line break regex is valid"));

/// Remaining control / format characters (zero-width spaces, BOMs, ...) are removed.
#[allow(clippy::expect_used)]
static INVISIBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Cc}\p{Cf}]").expect("invisible char regex is valid"));

fn replace_restricted(c: char) -> char {
    match c {
        '*' => '＊',
        ':' => '：',
        '<' => '＜',
        '>' => '＞',
        '|' => '｜',
        '?' => '？',
        '"' => '＂',
        '/' => '／',
        '\\' => '＼',
        c => c,
    }
}

/// Removes line breaks and invisible characters, then trims.
#[must_use]
pub fn clean_title(value: &str) -> String {
    let value = LINE_BREAKS.replace_all(value, " ");
    let value = INVISIBLE.replace_all(&value, "");
    value.trim().to_string()
}

/// Cleans one component of a name (e.g. a title or an author) without
/// applying length limits.
#[must_use]
pub fn clean_basename_component(name: &str) -> String {
    let replaced: String = name.chars().map(replace_restricted).collect();
    clean_title(&replaced)
}

/// Returns a safe directory-style basename.
///
/// Trailing dots are removed (Windows rejects them), whitespace is trimmed and
/// the result is truncated to [`FILENAME_MAX_LENGTH`] bytes on a char boundary.
#[must_use]
pub fn clean_basename(name: &str) -> String {
    let name = clean_basename_component(name);
    let name = trim_name_end(&name);
    prefix_in_bytes(name, FILENAME_MAX_LENGTH).to_string()
}

/// Like [`clean_basename`] but treats `name` as `base + ext` and keeps the
/// extension intact when it is short and has no spaces.
#[must_use]
pub fn clean_file_basename(name: &str) -> String {
    let name = clean_basename_component(name);
    let name = trim_name_end(&name);
    let ext = extension(name);
    if ext.len() > MAX_PRESERVED_EXT_LEN || ext.contains(' ') {
        return prefix_in_bytes(name, FILENAME_MAX_LENGTH).to_string();
    }
    let base = name[..name.len() - ext.len()].trim();
    format!(
        "{}{ext}",
        prefix_in_bytes(base, FILENAME_MAX_LENGTH.saturating_sub(ext.len()))
    )
}

fn trim_name_end(name: &str) -> &str {
    name.trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_start()
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a char.
#[must_use]
pub fn prefix_in_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Extension of a basename including the leading dot, or `""`.
///
/// Everything from the last dot is the extension, so `.DS_Store` has extension
/// `.DS_Store` and `archive.tar.gz` has `.gz`.
#[must_use]
pub fn extension(name: &str) -> &str {
    name.rfind('.').map_or("", |pos| &name[pos..])
}

/// Returns `dir/name`, or `dir/base.N.ext` with the smallest `N >= 1` that
/// does not exist yet.
#[must_use]
pub fn new_file_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !path_exists(&candidate) {
        return candidate;
    }
    let ext = extension(name);
    let base = &name[..name.len() - ext.len()];
    (1..)
        .map(|i| dir.join(format!("{base}.{i}{ext}")))
        .find(|path| !path_exists(path))
        .unwrap_or(candidate)
}

/// `true` when something (file, dir or dangling symlink) occupies `path`.
#[must_use]
pub fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Filename derived from the last URL path segment (percent-decoded).
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let cleaned = clean_file_basename(&decoded);
    (!cleaned.is_empty()).then_some(cleaned)
}
