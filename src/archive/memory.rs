//! In-memory archive

use super::{ArchiveEntry, ModArchive};
use crate::hash::compute_entries_hash;
use crate::paths::to_archive_path;
use anyhow::Result;
use std::collections::BTreeMap;

/// Archive whose entries are already in memory.
///
/// Folders are implicit: only files are stored, the traverser derives the
/// hierarchy from the paths.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    label: String,
    files: BTreeMap<String, Vec<u8>>,
    hash: String,
}

impl MemoryArchive {
    pub fn new<I, P, D>(label: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        let files: BTreeMap<String, Vec<u8>> = files
            .into_iter()
            .map(|(path, data)| (to_archive_path(path.as_ref()), data.into()))
            .collect();
        let hash = compute_entries_hash(files.iter().map(|(p, d)| (p.as_str(), d.as_slice())));

        Self {
            label: label.into(),
            files,
            hash,
        }
    }
}

impl ModArchive for MemoryArchive {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(&to_archive_path(path)).cloned())
    }

    fn entries(&self) -> Vec<ArchiveEntry> {
        self.files.keys().map(ArchiveEntry::file).collect()
    }

    fn version_hash(&self) -> &str {
        &self.hash
    }

    fn label(&self) -> &str {
        &self.label
    }
}
