use super::index::RawIndexEntry;
use std::collections::HashSet;
use std::path::Path;

/// Ordered set of RAW candidates for one JPEG, unique by path.
#[derive(Debug, Clone, Default)]
pub struct Candidates<'a> {
    entries: Vec<&'a RawIndexEntry>,
}

impl<'a> Candidates<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exactly one candidate left.
    pub fn is_settled(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn single(&self) -> Option<&'a RawIndexEntry> {
        match self.entries.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a RawIndexEntry> + '_ {
        self.entries.iter().copied()
    }

    pub fn into_vec(self) -> Vec<&'a RawIndexEntry> {
        self.entries
    }

    /// With several candidates and a known creation key, keep those sharing
    /// the key. If none share it, the set is left as it was.
    pub fn narrow_to_key(self, key: Option<&str>) -> Self {
        let Some(key) = key else { return self };
        if self.entries.len() <= 1 {
            return self;
        }
        let narrowed: Self = self
            .iter()
            .filter(|e| e.create_key.as_deref() == Some(key))
            .collect();
        if narrowed.is_empty() { self } else { narrowed }
    }

    /// Candidates present in both sets, in `self` order.
    pub fn intersect(&self, other: &Candidates<'a>) -> Self {
        let keep: HashSet<&Path> = other.iter().map(|e| e.path.as_path()).collect();
        self.iter().filter(|e| keep.contains(e.path.as_path())).collect()
    }

    pub fn retain(&mut self, f: impl FnMut(&&'a RawIndexEntry) -> bool) {
        self.entries.retain(f);
    }
}

impl<'a> FromIterator<&'a RawIndexEntry> for Candidates<'a> {
    fn from_iter<I: IntoIterator<Item = &'a RawIndexEntry>>(iter: I) -> Self {
        let mut seen: HashSet<&'a Path> = HashSet::new();
        let entries = iter
            .into_iter()
            .filter(|&e| seen.insert(e.path.as_path()))
            .collect();
        Self { entries }
    }
}
