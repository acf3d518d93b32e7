//! Integration tests for the normalize pipeline on real directories.

use std::fs;
use std::path::Path;

use mediadl_core::transform::{BAK_DIR, DEFAULT_PIPELINE, LOG_FILE};
use mediadl_core::{Pipeline, TransformError, TransformOptions, TransformerRegistry};
use tempfile::TempDir;

const CREDIT: &str = "联系邮箱:admin@asmrconnecting.xyz\n其他内容\n";

/// The default pipeline without the flac step.
fn pipeline() -> Pipeline {
    let tokens: Vec<&str> = DEFAULT_PIPELINE
        .iter()
        .copied()
        .filter(|token| *token != "wav")
        .collect();
    Pipeline::parse(&tokens, &TransformerRegistry::with_builtin()).expect("valid pipeline")
}

fn write(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

fn visible_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// A downloaded album as it typically arrives: wrapped in a folder, with a
/// disguised extension, CRLF text, a credit file and OS junk.
fn downloaded_album(root: &Path) {
    let inner = root.join("Wrapper").join("Album");
    write(&inner.join("track.mp42"), &vec![7u8; 200 * 1024]);
    write(&inner.join("notes.txt"), b"line one\r\nline two\r\n");
    write(&inner.join("Read_Me.txt"), CREDIT.as_bytes());
    write(&inner.join("Thumbs.db"), b"junk");
    let mut zip = b"PK\x03\x04".to_vec();
    zip.resize(64, 0);
    write(&inner.join("disc.rar"), &zip);
    write(&inner.join("Scans. ").join("cover?.jpg"), b"jpg");
}

// ==================== Default Pipeline ====================

#[test]
fn test_default_pipeline_normalizes_download() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    downloaded_album(root);

    let ctx = pipeline().transform(root, &TransformOptions::new());

    assert!(ctx.err().is_none(), "unexpected error: {:?}", ctx.err());
    assert!(ctx.changed());
    assert_eq!(
        visible_names(root),
        vec!["Scans", "disc.zip", "notes.txt", "track.mp4"]
    );
    assert_eq!(
        fs::read_to_string(root.join("notes.txt")).expect("read"),
        "line one\nline two\n"
    );
    assert_eq!(visible_names(&root.join("Scans")), vec!["cover？.jpg"]);
    assert!(root.join(BAK_DIR).join(LOG_FILE).is_file());
}

#[test]
fn test_second_run_changes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    downloaded_album(root);
    let pipeline = pipeline();

    let first = pipeline.transform(root, &TransformOptions::new());
    assert!(first.err().is_none());
    let before = visible_names(root);

    let second = pipeline.transform(root, &TransformOptions::new());
    assert!(second.err().is_none());
    assert!(!second.changed());
    assert_eq!(visible_names(root), before);
}

#[test]
fn test_log_records_each_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    downloaded_album(root);
    let pipeline = pipeline();

    pipeline.transform(root, &TransformOptions::new());
    pipeline.transform(root, &TransformOptions::new());

    let log = fs::read_to_string(root.join(BAK_DIR).join(LOG_FILE)).expect("read log");
    assert_eq!(log.matches("Start transforms").count(), 2);
    assert!(log.contains("All transforms completed, changed=true"));
    assert!(log.contains("All transforms completed, changed=false"));
}

// ==================== Content Gate ====================

#[test]
fn test_small_directory_is_invalid_contents() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    write(&root.join("a.txt"), b"tiny");
    write(&root.join("cover.jpg"), &vec![1u8; 200 * 1024]);

    let ctx = pipeline().transform(root, &TransformOptions::new());

    let err = ctx.err().expect("noempty should fail");
    assert!(err.is_invalid_contents());
    assert!(root.join("a.txt").is_file());
}

#[test]
fn test_min_size_option_lowers_the_gate() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path();
    write(&root.join("a.bin"), &[1u8; 64]);
    let mut options = TransformOptions::new();
    options.merge_query("min_size=10");

    let ctx = pipeline().transform(root, &options);

    assert!(ctx.err().is_none(), "unexpected error: {:?}", ctx.err());
}

#[test]
fn test_external_backup_dir_is_used() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("album");
    let bak = temp_dir.path().join("bak");
    write(&root.join("a.bin"), &vec![1u8; 200 * 1024]);
    let mut options = TransformOptions::new();
    options.set("bakdir", bak.to_str().expect("utf-8 path"));

    let ctx = pipeline().transform(&root, &options);

    assert!(ctx.err().is_none());
    assert!(bak.join(LOG_FILE).is_file());
    assert!(!root.join(BAK_DIR).exists());
}

// ==================== Parsing ====================

#[test]
fn test_unknown_transformer_is_rejected() {
    let err = Pipeline::parse(&["text", "nosuch"], &TransformerRegistry::with_builtin())
        .expect_err("unknown name");
    assert!(matches!(err, TransformError::UnknownTransformer(name) if name == "nosuch"));
}

#[test]
fn test_default_pipeline_parses_with_wav() {
    let pipeline = Pipeline::parse(DEFAULT_PIPELINE, &TransformerRegistry::with_builtin())
        .expect("valid pipeline");
    let names: Vec<Vec<&str>> = pipeline
        .steps()
        .iter()
        .map(|step| step.transformers.iter().map(|t| t.name()).collect())
        .collect();
    assert_eq!(
        names,
        vec![
            vec!["decensorship", "correctext", "text", "nocredit", "denesting"],
            vec!["wav"],
            vec!["noempty"],
            vec!["normalizename"],
            vec!["clean"],
        ]
    );
}
