//! Input/output path resolution and user parameter parsing.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ConversionError;
use crate::geometry::{DEFAULT_GRID_WIDTH, MAX_GRID_WIDTH, MIN_GRID_WIDTH};

/// Video container extensions accepted as input, in lookup order.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];
/// Container of every produced file.
pub const OUTPUT_EXTENSION: &str = "mp4";

fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ACCEPTED_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

/// Find the input file for `base`.
///
/// An existing file is used as is; otherwise each accepted extension is
/// appended in turn and the first existing file wins.
pub fn resolve_input(base: &Path) -> Result<PathBuf, ConversionError> {
    if base.is_file() {
        return Ok(base.to_path_buf());
    }
    for ext in ACCEPTED_EXTENSIONS {
        let mut name = base.as_os_str().to_os_string();
        name.push(".");
        name.push(ext);
        let candidate = PathBuf::from(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ConversionError::InputNotFound(base.to_path_buf()))
}

/// Final output path: `<input stem>_ascii.mp4` beside the input when no
/// output is requested, otherwise the requested path with `.mp4` appended
/// unless it already ends in `.mp4`.
pub fn resolve_output(input: &Path, requested: Option<&Path>) -> PathBuf {
    match requested.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            let is_mp4 = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(OUTPUT_EXTENSION));
            if is_mp4 {
                path.to_path_buf()
            } else {
                let mut name = path.as_os_str().to_os_string();
                name.push(".");
                name.push(OUTPUT_EXTENSION);
                PathBuf::from(name)
            }
        }
        None => {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
            input.with_file_name(format!("{}_ascii.{}", stem, OUTPUT_EXTENSION))
        }
    }
}

/// Where the encoder writes the video-only render. It is removed after a
/// successful remux and kept as the result when remuxing fails.
pub fn silent_video_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    output.with_file_name(format!("{}_noaudio.{}", stem, OUTPUT_EXTENSION))
}

/// Interpret a typed grid width: empty means the default, anything that is
/// not an integer falls back to the default with a warning, and integers
/// are clamped to `MIN_GRID_WIDTH..=MAX_GRID_WIDTH`.
pub fn parse_width(input: &str) -> u32 {
    let input = input.trim();
    if input.is_empty() {
        return DEFAULT_GRID_WIDTH;
    }
    match input.parse::<i64>() {
        Ok(n) if n > MAX_GRID_WIDTH as i64 => {
            log::warn!("width {} is too wide, using {}", n, MAX_GRID_WIDTH);
            MAX_GRID_WIDTH
        }
        Ok(n) => n.max(MIN_GRID_WIDTH as i64) as u32,
        Err(_) => {
            log::warn!("invalid width '{}', using default {}", input, DEFAULT_GRID_WIDTH);
            DEFAULT_GRID_WIDTH
        }
    }
}

/// Video files directly inside `dir`, sorted by path.
pub fn discover_media_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && has_accepted_extension(p))
        .collect();
    files.sort();
    files
}
