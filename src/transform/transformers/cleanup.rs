//! Deleting transformers and the content-size gate.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use super::{visible_entries, visible_files};
use crate::naming::{extension, path_exists};
use crate::transform::{TransformContext, TransformError, Transformer, is_hidden};

/// OS junk removed by [`Clean`].
const JUNK_FILES: &[&str] = &["desktop.ini", "Thumbs.db", ".DS_Store"];

/// Partial-download control file suffix.
const ARIA2_EXT: &str = ".aria2";

/// Files larger than this are never treated as credit files.
const CREDIT_SCAN_MAX: u64 = 1024 * 1024;

/// Content signature of a known publisher credit file.
struct CreditFile {
    name: &'static str,
    prefixes: &'static [&'static str],
    sha256: Option<&'static str>,
    max_size: u64,
}

const CREDIT_FILES: &[CreditFile] = &[CreditFile {
    name: "Read_Me.txt",
    prefixes: &[
        "本资源为免费资源，如果你是从倒狗手上获取的请立即举报+拉黑\n",
        "如果喜欢且有财力的，请支持正版，\n",
        "出自asmrconnecting,联系邮箱:admin@asmrconnecting.xyz\n",
        "联系邮箱:admin@asmrconnecting.xyz\n",
    ],
    sha256: None,
    max_size: 2 * 1024,
}];

impl CreditFile {
    fn matches(&self, contents: &[u8]) -> bool {
        if contents.len() as u64 > self.max_size {
            return false;
        }
        if let Some(hash) = self.sha256 {
            return hex_digest(contents) == hash;
        }
        self.prefixes
            .iter()
            .any(|prefix| contents.starts_with(prefix.as_bytes()))
    }
}

fn hex_digest(contents: &[u8]) -> String {
    Sha256::digest(contents)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Deletes top-level publisher credit files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredit;

impl Transformer for NoCredit {
    fn name(&self) -> &str {
        "nocredit"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let mut changed = false;
        for entry in visible_entries(ctx.dir())? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let credits: Vec<&CreditFile> =
                CREDIT_FILES.iter().filter(|c| c.name == name).collect();
            if credits.is_empty() {
                continue;
            }
            let path = entry.path();
            let metadata =
                fs::metadata(&path).map_err(|source| TransformError::io("stat", &path, source))?;
            if !metadata.is_file() || metadata.len() > CREDIT_SCAN_MAX {
                continue;
            }
            let contents =
                fs::read(&path).map_err(|source| TransformError::io("read", &path, source))?;
            if !credits.iter().any(|credit| credit.matches(&contents)) {
                continue;
            }
            ctx.log(format!("Remove credit file {name}"));
            fs::remove_file(&path).map_err(|source| TransformError::io("remove", &path, source))?;
            changed = true;
        }
        Ok(changed)
    }
}

/// Default minimum content size accepted by [`NoEmpty`].
pub const MIN_CONTENT_SIZE: u64 = 100 * 1024;

const NOEMPTY_IGNORE_FILES: &[&str] = &["desktop.ini", "Thumbs.db"];
const NOEMPTY_IGNORE_EXTS: &[&str] = &[".nfo"];
const NOEMPTY_IGNORE_NAMES: &[&str] = &["cover"];

/// Fails with [`TransformError::InvalidContents`] when the directory holds
/// less than `min_size` bytes of real content. Never modifies anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEmpty;

impl NoEmpty {
    fn counts(name: &str) -> bool {
        let ext = extension(name).to_lowercase();
        let base = name[..name.len() - ext.len()].to_lowercase();
        !(NOEMPTY_IGNORE_FILES.contains(&name)
            || NOEMPTY_IGNORE_EXTS.contains(&ext.as_str())
            || NOEMPTY_IGNORE_NAMES.contains(&base.as_str()))
    }
}

impl Transformer for NoEmpty {
    fn name(&self) -> &str {
        "noempty"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let min_size = match ctx.options().get("min_size") {
            "" => MIN_CONTENT_SIZE,
            value => value.parse().map_err(|_| TransformError::InvalidStep {
                arg: value.to_string(),
                reason: "min_size must be a byte count",
            })?,
        };
        let mut total = 0u64;
        for path in visible_files(ctx.dir())? {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !Self::counts(&name) {
                continue;
            }
            total += fs::metadata(&path)
                .map_err(|source| TransformError::io("stat", &path, source))?
                .len();
            if total >= min_size {
                return Ok(false);
            }
        }
        ctx.log(format!("contents size {total} is less than {min_size}"));
        Err(TransformError::InvalidContents)
    }
}

/// Deletes OS junk files and `.aria2` control files left without their
/// download.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clean;

impl Clean {
    fn is_orphan_control_file(path: &Path) -> bool {
        let name = path.to_string_lossy();
        name.strip_suffix(ARIA2_EXT)
            .is_some_and(|target| !path_exists(Path::new(target)))
    }
}

impl Transformer for Clean {
    fn name(&self) -> &str {
        "clean"
    }

    fn apply(&self, ctx: &mut TransformContext) -> Result<bool, TransformError> {
        let root = ctx.dir().to_path_buf();
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.file_type().is_dir() && is_hidden(entry.file_name())));
        let mut doomed = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|source| TransformError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if JUNK_FILES.contains(&name.as_ref()) {
                doomed.push(entry.into_path());
            } else if !is_hidden(entry.file_name()) && Self::is_orphan_control_file(entry.path()) {
                doomed.push(entry.into_path());
            }
        }
        for path in &doomed {
            ctx.log(format!("Remove {path:?}"));
            fs::remove_file(path).map_err(|source| TransformError::io("remove", path, source))?;
        }
        Ok(!doomed.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transform::TransformOptions;

    fn ctx(dir: &Path) -> TransformContext {
        TransformContext::new(dir, TransformOptions::new())
    }

    #[test]
    fn test_nocredit_removes_matching_prefix_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Read_Me.txt"),
            "联系邮箱:admin@asmrconnecting.xyz\nmore text\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("Read_Me.txt"), "联系邮箱:admin@asmrconnecting.xyz\n")
            .unwrap();
        let mut ctx = ctx(dir.path());

        assert!(NoCredit.apply(&mut ctx).unwrap());
        assert!(!dir.path().join("Read_Me.txt").exists());
        assert!(dir.path().join("sub").join("Read_Me.txt").exists());
        assert!(!NoCredit.apply(&mut ctx).unwrap());
    }

    #[test]
    fn test_nocredit_keeps_unrelated_readme() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Read_Me.txt"), "track list\n").unwrap();
        assert!(!NoCredit.apply(&mut ctx(dir.path())).unwrap());
        assert!(dir.path().join("Read_Me.txt").exists());
    }

    #[test]
    fn test_credit_file_size_limit() {
        let credit = &CREDIT_FILES[0];
        let mut contents = credit.prefixes[0].as_bytes().to_vec();
        assert!(credit.matches(&contents));
        contents.resize(3 * 1024, b'x');
        assert!(!credit.matches(&contents));
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(
            hex_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_noempty_ignores_cover_and_nfo() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cover.JPG"), vec![0u8; 200 * 1024]).unwrap();
        fs::write(dir.path().join("info.nfo"), vec![0u8; 200 * 1024]).unwrap();
        fs::write(dir.path().join("track.mp3"), vec![0u8; 10]).unwrap();
        let err = NoEmpty.apply(&mut ctx(dir.path())).unwrap_err();
        assert!(err.is_invalid_contents());
    }

    #[test]
    fn test_noempty_accepts_enough_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("disc1")).unwrap();
        fs::write(dir.path().join("disc1").join("a.mp3"), vec![0u8; 60 * 1024]).unwrap();
        fs::write(dir.path().join("b.mp3"), vec![0u8; 60 * 1024]).unwrap();
        assert!(!NoEmpty.apply(&mut ctx(dir.path())).unwrap());
    }

    #[test]
    fn test_noempty_min_size_option() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), vec![0u8; 10]).unwrap();
        let mut options = TransformOptions::new();
        options.set("min_size", "5");
        let mut ctx = TransformContext::new(dir.path(), options);
        assert!(!NoEmpty.apply(&mut ctx).unwrap());
    }

    #[test]
    fn test_clean_removes_junk_and_orphans() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("Thumbs.db"), b"x").unwrap();
        fs::write(dir.path().join("sub").join(".DS_Store"), b"x").unwrap();
        fs::write(dir.path().join("gone.zip.aria2"), b"x").unwrap();
        fs::write(dir.path().join("kept.zip"), b"x").unwrap();
        fs::write(dir.path().join("kept.zip.aria2"), b"x").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        let mut ctx = ctx(dir.path());

        assert!(Clean.apply(&mut ctx).unwrap());
        assert!(!dir.path().join("Thumbs.db").exists());
        assert!(!dir.path().join("sub").join(".DS_Store").exists());
        assert!(!dir.path().join("gone.zip.aria2").exists());
        assert!(dir.path().join("kept.zip.aria2").exists());
        assert!(dir.path().join(".hidden").exists());
        assert!(!Clean.apply(&mut ctx).unwrap());
    }

    #[test]
    fn test_clean_skips_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".bak")).unwrap();
        fs::write(dir.path().join(".bak").join("Thumbs.db"), b"x").unwrap();
        assert!(!Clean.apply(&mut ctx(dir.path())).unwrap());
        assert!(dir.path().join(".bak").join("Thumbs.db").exists());
    }
}
