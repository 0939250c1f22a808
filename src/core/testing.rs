//! In-memory `MetadataTool` for tests.

use super::exiftool::{ExifToolError, MetadataTool};
use super::record::{MetadataRecord, Tag};
use super::scanner;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct FakeTool {
    files: BTreeMap<PathBuf, MetadataRecord>,
    failing_grafts: HashSet<PathBuf>,
    reads: AtomicUsize,
    scans: AtomicUsize,
    grafts: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, record: MetadataRecord) -> Self {
        self.files.insert(path.as_ref().to_path_buf(), record);
        self
    }

    /// Register a record under its own `SourceFile`.
    pub fn with_record(self, record: MetadataRecord) -> Self {
        let path = record
            .source_path()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.with_file(path, record)
    }

    pub fn failing_graft(mut self, target: impl AsRef<Path>) -> Self {
        self.failing_grafts.insert(target.as_ref().to_path_buf());
        self
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn grafts(&self) -> Vec<(PathBuf, PathBuf)> {
        self.grafts.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl MetadataTool for FakeTool {
    fn read_tags(&self, path: &Path, _tags: &[Tag]) -> Option<MetadataRecord> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.files.get(path).cloned()
    }

    fn scan_tree(
        &self,
        root: &Path,
        extensions: &[String],
        _tags: &[Tag],
    ) -> Result<Vec<MetadataRecord>, ExifToolError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let extensions = scanner::extension_set(extensions);
        Ok(self
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(root) && scanner::has_extension(path, &extensions))
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn graft_gps(&self, source: &Path, target: &Path, dry_run: bool) -> Result<(), ExifToolError> {
        if dry_run {
            return Ok(());
        }
        if self.failing_grafts.contains(target) {
            return Err(ExifToolError::CommandFailed {
                exit_code: 1,
                message: format!("Error: Can't write {}", target.display()),
            });
        }
        if let Ok(mut grafts) = self.grafts.lock() {
            grafts.push((source.to_path_buf(), target.to_path_buf()));
        }
        Ok(())
    }
}
