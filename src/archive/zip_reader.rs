//! Zip-backed mod archive

use super::{ArchiveEntry, ModArchive};
use crate::hash::compute_file_hash;
use crate::paths::to_archive_path;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

/// A mod packaged as a zip file on disk
pub struct ZipModArchive {
    label: String,
    archive: Mutex<ZipArchive<BufReader<File>>>,
    /// normalized path -> name as stored in the zip
    names: HashMap<String, String>,
    entries: Vec<ArchiveEntry>,
    hash: String,
}

impl ZipModArchive {
    /// Open a mod zip and index its entries
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open: {}", path.display()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("Failed to read as ZIP archive: {}", path.display()))?;

        let mut names = HashMap::new();
        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let raw_name = file.name().to_string();
            let normalized = to_archive_path(&raw_name);
            entries.push(ArchiveEntry {
                path: normalized.clone(),
                is_dir: file.is_dir(),
            });
            names.insert(normalized, raw_name);
        }

        let hash = compute_file_hash(path)?;
        debug!(
            "Opened mod archive {} ({} entries, hash {})",
            path.display(),
            entries.len(),
            hash
        );

        Ok(Self {
            label: path.display().to_string(),
            archive: Mutex::new(archive),
            names,
            entries,
            hash,
        })
    }
}

impl ModArchive for ZipModArchive {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(name) = self.names.get(&to_archive_path(path)) else {
            return Ok(None);
        };

        let mut archive = self
            .archive
            .lock()
            .map_err(|_| anyhow!("zip reader lock poisoned for {}", self.label))?;

        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open {} in {}", path, self.label))
            }
        };

        if file.is_dir() {
            return Ok(None);
        }

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .with_context(|| format!("Failed to read {} in {}", path, self.label))?;
        Ok(Some(data))
    }

    fn entries(&self) -> Vec<ArchiveEntry> {
        self.entries.clone()
    }

    fn version_hash(&self) -> &str {
        &self.hash
    }

    fn label(&self) -> &str {
        &self.label
    }
}
