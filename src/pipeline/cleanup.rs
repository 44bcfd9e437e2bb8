//! Removal of leftover per-job artifacts.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::PipelineError;

/// Suffix of the generated VapourSynth script next to each input.
pub const SCRIPT_SUFFIX: &str = "_temp_script.vpy";

const INTERMEDIATE_SUFFIXES: &[&str] = &["_intermediate.mov", "_intermediate.mkv"];
const INDEX_EXTENSIONS: &[&str] = &[".ffindex", ".lwi"];

/// Whether `file_name` is a leftover of a job on `stem`.
///
/// Matches the generated script, intermediate encodes and the source
/// indexes written by ffms2 / lsmash (`<stem>.<ext>.ffindex`).
pub fn is_stale_artifact(file_name: &str, stem: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(stem) else {
        return false;
    };

    if rest == SCRIPT_SUFFIX || INTERMEDIATE_SUFFIXES.contains(&rest) {
        return true;
    }

    rest.starts_with('.') && INDEX_EXTENSIONS.iter().any(|ext| rest.ends_with(ext))
}

/// Delete stale artifacts of `stem` directly inside `dir`.
///
/// Failures are logged and skipped. Returns the number of files removed.
pub fn remove_stale_artifacts(dir: &Path, stem: &str) -> usize {
    let mut removed = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_stale_artifact(name, stem) {
            continue;
        }

        if remove_file_logged(entry.path()) {
            tracing::debug!("Removed stale artifact {}", entry.path().display());
            removed += 1;
        }
    }

    removed
}

/// Remove one file, logging any failure other than it already being gone.
pub fn remove_file_logged(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(source) => {
            let err = PipelineError::CleanupFailure {
                path: PathBuf::from(path),
                source,
            };
            tracing::warn!("{}", err);
            false
        }
    }
}
