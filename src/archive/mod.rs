//! Mod archive access.
//!
//! The add-on only needs two things from a mod archive: the bytes of a named
//! entry and the flat list of entry paths. `ZipModArchive` serves both from a
//! zip file on disk (zip crate), `MemoryArchive` from a map held in memory.

mod memory;
mod zip_reader;

pub use memory::MemoryArchive;
pub use zip_reader::ZipModArchive;

use anyhow::Result;

/// One entry of an archive's flat path listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, forward slashes, folders end with `/`
    pub path: String,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Read access to a mod's packaged files
pub trait ModArchive: Send + Sync {
    /// Bytes of the entry at `path`, `None` when the archive has no such file
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Read an entry as UTF-8 text
    fn read_string(&self, path: &str) -> Result<Option<String>> {
        match self.read(path)? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
            None => Ok(None),
        }
    }

    /// Every entry in the archive
    fn entries(&self) -> Vec<ArchiveEntry>;

    /// Content hash identifying this exact build of the mod
    fn version_hash(&self) -> &str;

    /// Human-readable origin, used in log messages
    fn label(&self) -> &str;
}
