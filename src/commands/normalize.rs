//! Normalize command handler: run the transform pipeline over download
//! directories, with optional locking, moving, cleanup and restore.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use mediadl_core::Config;
use mediadl_core::naming::path_exists;
use mediadl_core::transform::{
    BAK_DIR, BAKDIR_OPTION, DEFAULT_PIPELINE, LOG_FILE, Pipeline, TF_PREFIX, TMP_DIR,
    TransformOptions, TransformerRegistry,
};
use tracing::{debug, error, info, warn};

use super::confirm;
use crate::cli::NormalizeArgs;

/// Directories modified more recently than this are still being written.
const RECENT_WINDOW: Duration = Duration::from_secs(60);

/// Partial-download markers; a directory holding one is incomplete.
const INCOMPLETE_FILE_EXTS: &[&str] = &[".aria2", ".!qB"];

/// Name of the flac step in [`DEFAULT_PIPELINE`].
const WAV_STEP: &str = "wav";

pub async fn run_normalize_command(config: &Config, args: &NormalizeArgs) -> Result<()> {
    let mut options = TransformOptions::new();
    for option in &args.options {
        if !option.contains('=') {
            bail!("invalid option {option}");
        }
        options.merge_query(option);
    }
    for password in args.passwords.iter().chain(&config.passwords) {
        options.add("password", password.as_str());
    }
    if let Some(save_path) = &args.save_path {
        options.set(
            BAKDIR_OPTION,
            save_path.join(BAK_DIR).to_string_lossy().into_owned(),
        );
    }

    let dirs = collect_dirs(args)?;
    if args.clean {
        return clean(&dirs, args.save_path.as_deref(), args.force);
    }
    if args.restore {
        return restore(&dirs);
    }
    if let Some(move_to) = &args.move_to {
        fs::create_dir_all(move_to).context("failed to make move-to dir")?;
    }

    let pipeline = Arc::new(build_pipeline(args.no_flac, &mut options)?);
    let mut errors = 0usize;
    let total = dirs.len();
    for (index, dir) in dirs.iter().enumerate() {
        print!("({}/{total}) ", index + 1);
        match process_dir(dir, &pipeline, &options, args).await {
            Ok(()) => {}
            Err(DirFailure::Counted) => errors += 1,
            Err(DirFailure::Ignored) => {}
        }
    }
    println!("\nAll Done with {errors} errors. Logs can be found in '{LOG_FILE}' of bak dir(s)");
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}

/// Default pipeline, without `wav` when flac is disabled or unavailable.
fn build_pipeline(no_flac: bool, options: &mut TransformOptions) -> Result<Pipeline> {
    let mut use_flac = !no_flac;
    if use_flac && !options.has("flac_binary") {
        match which::which("flac") {
            Ok(path) => options.set("flac_binary", path.to_string_lossy().into_owned()),
            Err(_) => {
                warn!("flac binary is not found, wav files will not be converted");
                use_flac = false;
            }
        }
    }
    let tokens: Vec<&str> = DEFAULT_PIPELINE
        .iter()
        .copied()
        .filter(|token| use_flac || *token != WAV_STEP)
        .collect();
    warn!("Used transformers: {tokens:?}");
    Pipeline::parse(&tokens, &TransformerRegistry::with_builtin())
        .context("fail to create normalizer")
}

/// Absolute directories to work on.
fn collect_dirs(args: &NormalizeArgs) -> Result<Vec<PathBuf>> {
    if let Some(save_path) = &args.save_path {
        let mut dirs = Vec::new();
        let entries = fs::read_dir(save_path).context("failed to read dir")?;
        for entry in entries {
            let entry = entry.context("failed to read dir")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let wanted = if args.restore {
                name.starts_with(TF_PREFIX)
            } else {
                !name.starts_with('.')
            };
            if !wanted || !entry.path().is_dir() {
                continue;
            }
            dirs.push(std::path::absolute(entry.path()).with_context(|| {
                format!("failed to get abs dir of {name:?} in save path")
            })?);
        }
        dirs.sort();
        return Ok(dirs);
    }
    if args.dirs.is_empty() {
        return Ok(vec![std::env::current_dir()?]);
    }
    args.dirs
        .iter()
        .map(|dir| std::path::absolute(dir).map_err(Into::into))
        .collect()
}

/// How a failed directory counts toward the batch result.
enum DirFailure {
    Counted,
    Ignored,
}

async fn process_dir(
    dir: &Path,
    pipeline: &Arc<Pipeline>,
    options: &TransformOptions,
    args: &NormalizeArgs,
) -> Result<(), DirFailure> {
    let metadata = match fs::metadata(dir) {
        Ok(metadata) => metadata,
        Err(err) => {
            println!("X {dir:?}: failed to access dir: {err}");
            return Err(DirFailure::Counted);
        }
    };
    if !args.all && is_recent(metadata.modified().ok()) {
        println!("- {dir:?}: skip recently modified dir");
        return Ok(());
    }
    let entries = match fs::read_dir(dir).and_then(|entries| entries.collect::<Result<Vec<_>, _>>()) {
        Ok(entries) => entries,
        Err(err) => {
            println!("X {dir:?}: failed to read dir: {err}");
            return Err(DirFailure::Counted);
        }
    };
    if entries.is_empty() {
        println!("- {dir:?}: skip empty dir");
        return Ok(());
    }
    let incomplete = entries.iter().any(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        !entry.path().is_dir() && INCOMPLETE_FILE_EXTS.iter().any(|ext| name.ends_with(ext))
    });
    if incomplete {
        println!("- {dir:?}: skip incomplete dir");
        return Ok(());
    }

    println!("→ {dir:?}: processing.");
    let base = dir.file_name().map(ToOwned::to_owned).unwrap_or_default();
    let parent = dir.parent().unwrap_or_else(|| Path::new("/"));
    let mut process_path = dir.to_path_buf();
    if args.lock {
        let locked = parent.join(format!("{TF_PREFIX}{}", base.to_string_lossy()));
        if let Err(err) = fs::rename(dir, &locked) {
            println!("X {dir:?}: failed to lock (rename to {locked:?}): {err}");
            return Err(DirFailure::Counted);
        }
        process_path = locked;
    }

    let ctx = {
        let pipeline = Arc::clone(pipeline);
        let options = options.clone();
        let path = process_path.clone();
        tokio::task::spawn_blocking(move || pipeline.transform(&path, &options)).await
    };
    let ctx = match ctx {
        Ok(ctx) => ctx,
        Err(err) => {
            println!("X {dir:?}: transform task failed: {err}");
            unlock(&process_path, dir);
            return Err(DirFailure::Counted);
        }
    };
    let bak_dir = ctx.backup_dir().display().to_string();
    if let Some(err) = ctx.err() {
        let failure = if err.is_invalid_contents() {
            println!(
                "! {dir:?}: invalid contents, changed={}, bak_dir={bak_dir}.",
                ctx.changed()
            );
            DirFailure::Ignored
        } else {
            println!(
                "X {dir:?}: changed={}, err={err}, bak_dir={bak_dir}.",
                ctx.changed()
            );
            DirFailure::Counted
        };
        unlock(&process_path, dir);
        return Err(failure);
    }
    if ctx.changed() {
        println!("✓ {dir:?}: bak_dir={bak_dir}");
    } else {
        println!("- {dir:?}: no_changes.");
    }

    let target = match &args.move_to {
        Some(move_to) => move_to.join(&base),
        None => dir.to_path_buf(),
    };
    if target != process_path {
        if path_exists(&target) {
            error!(
                "Normalize {process_path:?} final: failed to rename to {target:?}: target already exists"
            );
            unlock(&process_path, dir);
        } else if let Err(err) = fs::rename(&process_path, &target) {
            error!("Normalize {process_path:?} final: failed to rename to {target:?}: {err}");
        }
    }
    Ok(())
}

fn is_recent(modified: Option<SystemTime>) -> bool {
    modified
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age <= RECENT_WINDOW)
}

/// Renames a locked directory back to its original name.
fn unlock(process_path: &Path, dir: &Path) {
    if process_path != dir && !path_exists(dir) {
        if let Err(err) = fs::rename(process_path, dir) {
            error!("Failed to unlock {process_path:?}: {err}");
        }
    }
}

fn clean(dirs: &[PathBuf], save_path: Option<&Path>, force: bool) -> Result<()> {
    let mut doomed: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| [dir.join(BAK_DIR), dir.join(TMP_DIR)])
        .filter(|path| path_exists(path))
        .collect();
    if let Some(bak) = save_path.map(|path| path.join(BAK_DIR)) {
        if path_exists(&bak) {
            doomed.push(bak);
        }
    }
    if doomed.is_empty() {
        info!("No files to clean");
        return Ok(());
    }
    if !force {
        println!();
        for path in &doomed {
            println!("{}", path.display());
        }
        println!();
        if !confirm("Above backup / tmp dirs / files will be removed")? {
            bail!("abort");
        }
    }
    let mut errors = 0;
    for path in &doomed {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(err) = result {
            error!("Failed to remove {path:?}: {err}");
            errors += 1;
        } else {
            debug!(path = %path.display(), "Removed");
        }
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}

fn restore(dirs: &[PathBuf]) -> Result<()> {
    let mut errors = 0;
    for dir in dirs {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(original) = name.strip_prefix(TF_PREFIX).filter(|rest| !rest.is_empty()) else {
            continue;
        };
        let target = dir.with_file_name(original);
        if path_exists(&target) {
            println!("X {dir:?} => {target:?}: target already exists");
            errors += 1;
        } else if let Err(err) = fs::rename(dir, &target) {
            println!("X {dir:?} => {target:?}: {err}");
            errors += 1;
        } else {
            println!("✓ {dir:?} => {target:?}");
        }
    }
    if errors > 0 {
        bail!("{errors} errors");
    }
    Ok(())
}
