use super::record::MetadataRecord;
use super::scanner;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cache contents: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache file name for a RAW root scanned with `extensions`. The digest
/// covers the canonical root and the normalized extension set, so a scan of
/// other file types never reuses this cache.
pub fn cache_file_name<S: AsRef<str>>(raw_root: &Path, extensions: &[S]) -> String {
    let root = raw_root
        .canonicalize()
        .unwrap_or_else(|_| raw_root.to_path_buf());
    let mut extensions: Vec<String> = scanner::extension_set(extensions).into_iter().collect();
    extensions.sort();

    let mut hasher = blake3::Hasher::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(extensions.join(",").as_bytes());
    let digest = hasher.finalize().to_hex();
    format!("raw-{}.json", &digest[..16])
}

/// Default cache file: one per RAW root and extension set, under the user
/// cache directory.
pub fn default_cache_path<S: AsRef<str>>(raw_root: &Path, extensions: &[S]) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gps-graft")
        .join(cache_file_name(raw_root, extensions))
}

/// Read a cached list of RAW records.
pub fn load(path: &Path) -> Result<Vec<MetadataRecord>, CacheError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write the list of RAW records, creating parent directories as needed.
pub fn store(path: &Path, records: &[MetadataRecord]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Tag;
    use tempfile::TempDir;

    #[test]
    fn test_store_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("raw.json");
        let records = vec![
            MetadataRecord::for_file("/raw/DSC_0001.NEF")
                .with(Tag::CreateDate, "2024:05:01 10:00:00")
                .with(Tag::ShutterCount, 5120),
        ];

        store(&path, &records).unwrap();
        assert_eq!(load(&path).unwrap(), records);
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("raw.json");
        assert!(matches!(load(&path), Err(CacheError::Io(_))));

        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load(&path), Err(CacheError::Json(_))));
    }

    #[test]
    fn test_default_path_depends_on_root() {
        let a = default_cache_path(Path::new("/photos/2024/raw"), &["nef"]);
        let b = default_cache_path(Path::new("/photos/2025/raw"), &["nef"]);
        assert_ne!(a, b);
        assert_eq!(a, default_cache_path(Path::new("/photos/2024/raw"), &["nef"]));
        assert!(a.to_string_lossy().ends_with(".json"));
    }

    #[test]
    fn test_default_path_depends_on_extensions() {
        let root = Path::new("/photos/2024/raw");
        let nef = cache_file_name(root, &["nef"]);
        assert_ne!(nef, cache_file_name(root, &["cr2"]));
        assert_ne!(nef, cache_file_name(root, &["nef", "cr2"]));
        // Order, case and leading dots do not matter.
        assert_eq!(
            cache_file_name(root, &["nef", "cr2"]),
            cache_file_name(root, &[".CR2", "NEF"])
        );
    }
}
