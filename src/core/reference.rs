//! On-demand lookup of reference JPEGs.
//!
//! The reference population (for example a published edit of the same shoot)
//! is never indexed up front. A file is located and read the first time a
//! JPEG of the same name needs it; the outcome, found or not, is remembered
//! for the rest of the run.

use super::exiftool::MetadataTool;
use super::record::{self, MetadataRecord};
use super::scanner;
use std::collections::HashMap;
use std::path::PathBuf;
use walkdir::WalkDir;

const REFERENCE_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Anything that can turn a JPEG file name into reference metadata.
pub trait ReferenceLookup {
    fn resolve(&mut self, file_name: &str) -> Option<MetadataRecord>;
}

pub struct ReferenceResolver<'t> {
    tool: &'t dyn MetadataTool,
    root: PathBuf,
    cache: HashMap<String, Option<MetadataRecord>>,
}

impl<'t> ReferenceResolver<'t> {
    pub fn new(tool: &'t dyn MetadataTool, root: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    /// Number of distinct file names looked up so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Paths that may hold the reference copy of `file_name`, best first:
    /// the file directly under the root, else every file with exactly that
    /// name anywhere below it, else the first JPEG whose name matches
    /// case-insensitively.
    fn candidate_paths(&self, file_name: &str) -> Vec<PathBuf> {
        let direct = self.root.join(file_name);
        if direct.exists() {
            return vec![direct];
        }

        let wanted = file_name.to_lowercase();
        let jpeg = scanner::extension_set(&REFERENCE_EXTENSIONS);
        let mut exact = Vec::new();
        let mut loose = None;

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name == file_name {
                exact.push(entry.path().to_path_buf());
            } else if loose.is_none()
                && scanner::has_extension(entry.path(), &jpeg)
                && name.to_lowercase() == wanted
            {
                loose = Some(entry.path().to_path_buf());
            }
        }

        if exact.is_empty() {
            loose.into_iter().collect()
        } else {
            exact
        }
    }

    fn locate(&self, file_name: &str) -> Option<MetadataRecord> {
        let tags = record::reference_tags();
        self.candidate_paths(file_name)
            .into_iter()
            .find_map(|path| self.tool.read_tags(&path, &tags).filter(|r| r.has_tags()))
    }
}

impl ReferenceLookup for ReferenceResolver<'_> {
    fn resolve(&mut self, file_name: &str) -> Option<MetadataRecord> {
        let key = file_name.to_lowercase();
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let found = self.locate(file_name);
        match &found {
            Some(reference) => log::info!(
                "[REF] {} -> CreateDate={:?} FrameCounter={:?} PreservedFileName={:?} Serial={:?} Lens={:?}",
                file_name,
                reference.text(record::Tag::CreateDate),
                reference.frame_counter(),
                reference.preserved_file_name(),
                reference.body_serial(),
                reference.lens(),
            ),
            None => log::info!("[REF] {}: no reference found", file_name),
        }

        self.cache.insert(key, found.clone());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Tag;
    use crate::core::testing::FakeTool;
    use std::fs;
    use tempfile::TempDir;

    fn reference_root() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("published").join("day1");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("IMG_0001.jpg"), b"jpeg").unwrap();
        fs::write(nested.join("IMG_0002.jpg"), b"jpeg").unwrap();
        fs::write(nested.join("img_0003.JPG"), b"jpeg").unwrap();
        fs::write(nested.join("img_0004.png"), b"png").unwrap();
        temp_dir
    }

    #[test]
    fn test_direct_hit() {
        let root = reference_root();
        let direct = root.path().join("IMG_0001.jpg");
        let tool = FakeTool::new()
            .with_file(&direct, MetadataRecord::for_file(&direct).with(Tag::ImageNumber, 1));
        let mut resolver = ReferenceResolver::new(&tool, root.path());

        let found = resolver.resolve("IMG_0001.jpg").unwrap();
        assert_eq!(found.frame_counter(), Some(1));
    }

    #[test]
    fn test_recursive_exact_name() {
        let root = reference_root();
        let nested = root.path().join("published/day1/IMG_0002.jpg");
        let tool = FakeTool::new()
            .with_file(&nested, MetadataRecord::for_file(&nested).with(Tag::ImageNumber, 2));
        let mut resolver = ReferenceResolver::new(&tool, root.path());

        assert_eq!(resolver.resolve("IMG_0002.jpg").unwrap().frame_counter(), Some(2));
    }

    #[test]
    fn test_case_insensitive_jpeg_fallback() {
        let root = reference_root();
        let nested = root.path().join("published/day1/img_0003.JPG");
        let tool = FakeTool::new()
            .with_file(&nested, MetadataRecord::for_file(&nested).with(Tag::ImageNumber, 3));
        let mut resolver = ReferenceResolver::new(&tool, root.path());

        assert_eq!(resolver.resolve("IMG_0003.jpg").unwrap().frame_counter(), Some(3));
        // Only JPEGs qualify for the loose match.
        assert!(resolver.resolve("IMG_0004.PNG").is_none());
    }

    #[test]
    fn test_empty_record_is_not_a_hit() {
        let root = reference_root();
        let direct = root.path().join("IMG_0001.jpg");
        let tool = FakeTool::new().with_file(&direct, MetadataRecord::for_file(&direct));
        let mut resolver = ReferenceResolver::new(&tool, root.path());

        assert!(resolver.resolve("IMG_0001.jpg").is_none());
    }

    #[test]
    fn test_lookups_are_memoized() {
        let root = reference_root();
        let nested = root.path().join("published/day1/IMG_0002.jpg");
        let tool = FakeTool::new()
            .with_file(&nested, MetadataRecord::for_file(&nested).with(Tag::ImageNumber, 2));
        let mut resolver = ReferenceResolver::new(&tool, root.path());

        for name in ["IMG_0002.jpg", "img_0002.JPG", "IMG_0002.jpg"] {
            assert!(resolver.resolve(name).is_some());
        }
        assert_eq!(tool.read_calls(), 1);

        // Misses are remembered too.
        for _ in 0..3 {
            assert!(resolver.resolve("IMG_9999.jpg").is_none());
        }
        assert_eq!(tool.read_calls(), 1);
        assert_eq!(resolver.cached(), 2);
    }
}
