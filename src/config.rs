//! Add-on configuration
//!
//! Defines where persistent stores live and how the in-memory image cache
//! is bounded.

use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Name under which the add-on registers and looks up its config block
pub const ADDON_NAME: &str = "BeautySelectorAddon";

/// Where the SQLite stores are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// One database file per store inside this directory
    Directory(PathBuf),
    /// Private in-memory databases, gone when the process exits
    InMemory,
}

impl StorageLocation {
    /// `~/.cache/beauty-selector` (platform equivalent)
    pub fn default_dir() -> Result<Self, ConfigError> {
        let dir = dirs::cache_dir()
            .ok_or(ConfigError::NoCacheDir)?
            .join("beauty-selector");
        Ok(StorageLocation::Directory(dir))
    }
}

/// Configuration for one load session
#[derive(Debug, Clone)]
pub struct AddonConfig {
    /// Add-on name matched against `addonName`/`modName` in boot.json
    pub addon_name: String,

    /// Storage for the order, file-list and image stores
    pub storage: StorageLocation,

    /// Host key prefix applied to every store name and persisted key
    pub key_prefix: Option<String>,

    /// Maximum entries in the in-memory image cache
    pub memory_cache_capacity: u64,

    /// Entries unused for this long are dropped from the in-memory cache
    pub memory_cache_ttl: Duration,

    /// How many "not initialized" lookups are logged before going quiet
    pub not_initialized_log_limit: usize,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            addon_name: ADDON_NAME.to_string(),
            storage: StorageLocation::InMemory,
            key_prefix: None,
            memory_cache_capacity: 30,
            memory_cache_ttl: Duration::from_secs(60),
            not_initialized_log_limit: 10,
        }
    }
}

impl AddonConfig {
    /// Default configuration storing databases under `dir`
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageLocation::Directory(dir.into()),
            ..Default::default()
        }
    }

    /// Remap a store name or key through the host key prefix
    pub fn loader_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Name of the key-value database holding the saved order
    pub fn order_db_name(&self) -> String {
        self.loader_key(&self.addon_name)
    }

    /// Key of the saved type order inside the key-value database
    pub fn order_save_key(&self) -> String {
        self.loader_key(&format!("{}_OrderSaveKey", self.addon_name))
    }

    pub fn file_list_db_name(&self) -> String {
        self.loader_key(&format!("{}_dbNameCacheFileList", self.addon_name))
    }

    pub fn image_store_db_name(&self) -> String {
        self.loader_key(&format!("{}_dbNameImageStore", self.addon_name))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addon_name.trim().is_empty() {
            return Err(ConfigError::EmptyAddonName);
        }

        if self.memory_cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }

        if self.memory_cache_ttl.is_zero() {
            return Err(ConfigError::ZeroCacheTtl);
        }

        if self.not_initialized_log_limit == 0 {
            return Err(ConfigError::ZeroLogLimit);
        }

        Ok(())
    }
}
