use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

/// Lower-cased extension set without leading dots.
pub fn extension_set<S: AsRef<str>>(extensions: &[S]) -> HashSet<String> {
    extensions
        .iter()
        .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
        .collect()
}

pub fn has_extension(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
        .unwrap_or(false)
}

/// Recursively collect files under `root` whose extension is in `extensions`
/// (case-insensitive). Unreadable entries are skipped. Sorted for stable output.
pub fn discover_files(root: &Path, extensions: &HashSet<String>) -> Result<Vec<PathBuf>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::InvalidPath {
            path: root.to_string_lossy().to_string(),
        });
    }

    let spinner = spinner(&format!("Scanning {}…", root.display()));
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        spinner.tick();
        if !entry.file_type().is_file() {
            continue;
        }
        if has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    spinner.finish_and_clear();
    files.sort();
    log::debug!("Found {} file(s) under {}", files.len(), root.display());
    Ok(files)
}

/// Spinner for indeterminate work; hidden when stderr is not a terminal.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress bar with a known length.
pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(msg.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("2024").join("05");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("DSC_0001.NEF"), b"raw").unwrap();
        fs::write(nested.join("dsc_0002.nef"), b"raw").unwrap();
        fs::write(nested.join("DSC_0002.JPG"), b"jpeg").unwrap();
        fs::write(nested.join("notes.txt"), b"text").unwrap();

        let files = discover_files(temp_dir.path(), &extension_set(&["nef"])).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| {
            p.extension().unwrap().to_string_lossy().eq_ignore_ascii_case("nef")
        }));
    }

    #[test]
    fn test_discover_missing_root() {
        let result = discover_files(Path::new("/non/existent/dir"), &extension_set(&["jpg"]));
        assert!(matches!(result, Err(ScanError::InvalidPath { .. })));
    }

    #[test]
    fn test_extension_set_normalizes() {
        let set = extension_set(&[".JPG", "jpeg"]);
        assert!(set.contains("jpg"));
        assert!(set.contains("jpeg"));
        assert!(has_extension(Path::new("/a/B.JpEg"), &set));
        assert!(!has_extension(Path::new("/a/B"), &set));
    }
}
