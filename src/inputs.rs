//! Input file collection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory scanned when no inputs are given.
pub const DEFAULT_INPUT_DIR: &str = "input";

/// Extensions accepted as video inputs, compared case-insensitively.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "ts", "m2ts", "mpg", "mpeg"];

/// Name fragments marking files this tool produced.
const OUTPUT_MARKERS: &[&str] = &["_deinterlaced", "_intermediate"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|v| v.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

fn is_own_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| OUTPUT_MARKERS.iter().any(|m| n.contains(m)))
        .unwrap_or(false)
}

/// Expand `args` into the list of files to process.
///
/// Files are taken as given when they carry a video extension. Directories
/// are scanned one level deep, sorted by name, skipping earlier outputs.
/// With no arguments `./input` is scanned. Duplicates are dropped, keeping
/// first-seen order.
pub fn collect_inputs(args: &[PathBuf]) -> Vec<PathBuf> {
    let default_dir = [PathBuf::from(DEFAULT_INPUT_DIR)];
    let args = if args.is_empty() { &default_dir[..] } else { args };

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            files.push(path);
        }
    };

    for arg in args {
        if arg.is_dir() {
            for path in scan_directory(arg) {
                push(path);
            }
        } else if arg.is_file() {
            if is_video_file(arg) {
                push(arg.clone());
            } else {
                tracing::warn!("Skipping {}: not a recognized video file", arg.display());
            }
        } else {
            tracing::warn!("Skipping {}: no such file or directory", arg.display());
        }
    }

    files
}

fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_video_file(p) && !is_own_output(p))
        .collect()
}
