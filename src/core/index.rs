use super::creation_key::compose_creation_key;
use super::record::{MetadataRecord, Tag};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// One indexed RAW file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawIndexEntry {
    pub path: PathBuf,
    pub create_key: Option<String>,
    /// Derived frame counter (shutter count, mechanical count or image number).
    pub shutter_count: Option<i64>,
    pub mechanical_shutter_count: Option<i64>,
    pub image_number: Option<i64>,
    pub file_number: Option<i64>,
    pub serial_number: Option<String>,
    pub lens_id: Option<String>,
}

impl RawIndexEntry {
    /// Returns `None` for records without a `SourceFile`.
    pub fn from_record(record: &MetadataRecord) -> Option<Self> {
        let path = record.source_path()?.to_path_buf();
        Some(Self {
            path,
            create_key: compose_creation_key(record),
            shutter_count: record.frame_counter(),
            mechanical_shutter_count: record.integer(Tag::MechanicalShutterCount),
            image_number: record.integer(Tag::ImageNumber),
            file_number: record.integer(Tag::FileNumber),
            serial_number: record.body_serial(),
            lens_id: record.lens(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lower-cased full file name.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Lower-cased file name without its extension.
pub fn stem_key(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| name.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub files: usize,
    pub creation_keys: usize,
    pub frame_counters: usize,
    pub image_numbers: usize,
    pub file_names: usize,
}

/// Five lookup tables over the RAW population. Buckets hold positions into
/// `entries`; every path appears once in `entries`, so at most once per bucket.
#[derive(Debug, Default)]
pub struct IndexStore {
    entries: Vec<RawIndexEntry>,
    by_creation_key: HashMap<String, Vec<usize>>,
    by_frame_counter: HashMap<i64, Vec<usize>>,
    by_image_number: HashMap<i64, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    by_stem: HashMap<String, Vec<usize>>,
}

impl IndexStore {
    /// Build all buckets. Records without a `SourceFile` are skipped and
    /// repeated paths keep their first occurrence.
    pub fn build(records: &[MetadataRecord]) -> Self {
        let mut store = Self::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for record in records {
            let Some(entry) = RawIndexEntry::from_record(record) else {
                log::debug!("Skipping RAW record without SourceFile");
                continue;
            };
            if !seen.insert(entry.path.clone()) {
                log::debug!("Duplicate RAW record for {}", entry.path.display());
                continue;
            }
            store.insert(entry);
        }

        store
    }

    fn insert(&mut self, entry: RawIndexEntry) {
        let id = self.entries.len();

        if let Some(key) = &entry.create_key {
            self.by_creation_key.entry(key.clone()).or_default().push(id);
        }
        if let Some(counter) = entry.shutter_count {
            self.by_frame_counter.entry(counter).or_default().push(id);
        }
        if let Some(number) = entry.image_number {
            self.by_image_number.entry(number).or_default().push(id);
        }

        let name = entry.file_name();
        self.by_name.entry(name_key(&name)).or_default().push(id);
        self.by_stem.entry(stem_key(&name)).or_default().push(id);

        self.entries.push(entry);
    }

    fn resolve<'a>(&'a self, ids: Option<&'a Vec<usize>>) -> Vec<&'a RawIndexEntry> {
        ids.map(|ids| ids.iter().map(|&id| &self.entries[id]).collect())
            .unwrap_or_default()
    }

    pub fn by_creation_key(&self, key: &str) -> Vec<&RawIndexEntry> {
        self.resolve(self.by_creation_key.get(key))
    }

    pub fn by_frame_counter(&self, counter: i64) -> Vec<&RawIndexEntry> {
        self.resolve(self.by_frame_counter.get(&counter))
    }

    pub fn by_image_number(&self, number: i64) -> Vec<&RawIndexEntry> {
        self.resolve(self.by_image_number.get(&number))
    }

    /// Case-insensitive lookup by full file name.
    pub fn by_name(&self, name: &str) -> Vec<&RawIndexEntry> {
        self.resolve(self.by_name.get(&name_key(name)))
    }

    /// Case-insensitive lookup by file name without extension.
    pub fn by_stem(&self, name: &str) -> Vec<&RawIndexEntry> {
        self.resolve(self.by_stem.get(&stem_key(name)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.entries.len(),
            creation_keys: self.by_creation_key.len(),
            frame_counters: self.by_frame_counter.len(),
            image_numbers: self.by_image_number.len(),
            file_names: self.by_name.len(),
        }
    }
}
