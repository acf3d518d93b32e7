//! File rewriters: text normalization and wav to flac conversion.

use std::path::Path;

use crate::transform::executor::{
    BinaryCommand, ErrorAction, FileRewriter, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, Rewrite,
};
use crate::transform::{TransformContext, TransformError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const TEXT_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// flac messages for inputs it cannot convert; such files are left as they are.
const IGNORED_FLAC_ERRORS: &[&str] = &[
    "unsupported format type",
    "unsupported WAVEFORMATEXTENSIBLE chunk",
    "has an ID3v2 tag",
    "--keep-foreign-metadata can only be used with WAVE",
    "ERROR: got partial sample",
    " is not a WAVE file",
    "ERROR: input file",
];

const FOREIGN_METADATA_READ_FAILED: &str = "read failed in WAVE/AIFF file (011)";

/// `.txt` files: LF line endings, UTF-8 BOM removed (or added with `bom=1`).
#[must_use]
pub fn text() -> FileRewriter {
    FileRewriter {
        name: "text",
        exts: &[".txt"],
        min_size: 0,
        max_size: Some(TEXT_SIZE_LIMIT),
        new_ext: None,
        companion_suffixes: &[],
        rewrite: Rewrite::Contents(normalize_text),
    }
}

fn normalize_text(
    input: &[u8],
    path: &Path,
    ctx: &mut TransformContext,
) -> Result<Option<Vec<u8>>, TransformError> {
    let want_bom = ctx.options().flag("bom");
    let body = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let Ok(text) = std::str::from_utf8(body) else {
        ctx.log(format!("{path:?} is not UTF-8 text, leave it"));
        return Ok(None);
    };
    let mut output = Vec::with_capacity(input.len() + UTF8_BOM.len());
    if want_bom {
        output.extend_from_slice(UTF8_BOM);
    }
    if text.contains('\r') {
        ctx.log("replace cr / crlf to lf");
        output.extend_from_slice(text.replace("\r\n", "\n").replace('\r', "\n").as_bytes());
    } else {
        output.extend_from_slice(body);
    }
    Ok((output != input).then_some(output))
}

fn flac_args(keep_foreign_metadata: bool) -> Vec<String> {
    let mut args = vec!["--best".to_string()];
    if keep_foreign_metadata {
        args.push("--keep-foreign-metadata-if-present".to_string());
    }
    args.extend(
        ["--output-name", OUTPUT_PLACEHOLDER, INPUT_PLACEHOLDER]
            .into_iter()
            .map(String::from),
    );
    args
}

fn on_flac_error(output: &str, ctx: &mut TransformContext) -> ErrorAction {
    if output.contains(FOREIGN_METADATA_READ_FAILED) {
        ctx.log("Failed to read wav metadata, do not preserve it");
        return ErrorAction::Retry(flac_args(false));
    }
    if let Some(ignored) = IGNORED_FLAC_ERRORS.iter().find(|msg| output.contains(*msg)) {
        ctx.log(format!("wav can not be converted to flac: {ignored}"));
        return ErrorAction::Skip;
    }
    ctx.log(format!("flac output: {output}"));
    ErrorAction::Fail
}

/// `.wav` to `.flac` via the `flac` binary (`flac_binary` overrides it).
#[must_use]
pub fn wav() -> FileRewriter {
    FileRewriter {
        name: "wav",
        exts: &[".wav"],
        min_size: 0,
        max_size: None,
        new_ext: Some(".flac"),
        companion_suffixes: &[".vtt", ".ass", ".srt", ".lrc"],
        rewrite: Rewrite::Binary(BinaryCommand {
            binary: "flac",
            args: flac_args(true),
            on_error: Some(on_flac_error),
            // flac mishandles some non-ASCII input paths
            hardlink: true,
        }),
    }
}
