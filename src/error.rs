//! Error types shared across the add-on

use std::path::PathBuf;

/// Persistent store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already closed")]
    Closed(&'static str),

    #[error("images already stored for mod [{mod_name}] type [{type_name}]")]
    AlreadyStored { mod_name: String, type_name: String },

    #[error("image stream for mod [{mod_name}] type [{type_name}] already finalized")]
    StreamFinalized { mod_name: String, type_name: String },

    #[error("failed to create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Reasons a mod or one of its types is not registered
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("cannot find addonPlugin in bootJson [{mod_name}]")]
    MissingAddonConfig { mod_name: String },

    #[error("invalid params [{mod_name}]")]
    InvalidParams { mod_name: String },

    #[error("have duplicate type in mod[{mod_name}]. invalid mod config")]
    DuplicateTypeInDeclaration { mod_name: String },

    #[error("type[{type_name}] already exist in [{owner}]. mod[{mod_name}] cannot add it")]
    TypeAlreadyOwned {
        type_name: String,
        owner: String,
        mod_name: String,
    },

    #[error("mod[{mod_name}] type[{type_name}] imgFileListFile[{file}] not found")]
    FileListMissing {
        mod_name: String,
        type_name: String,
        file: String,
    },

    #[error("mod[{mod_name}] type[{type_name}] imgFileListFile[{file}] is not a valid json")]
    FileListInvalidJson {
        mod_name: String,
        type_name: String,
        file: String,
    },

    #[error("mod[{mod_name}] type[{type_name}] imgFileListFile[{file}] is not a string array")]
    FileListNotStringArray {
        mod_name: String,
        type_name: String,
        file: String,
    },

    #[error("mod[{mod_name}] type[{type_name}] storage failed: {message}")]
    Storage {
        mod_name: String,
        type_name: String,
        message: String,
    },
}

impl RegistrationError {
    /// Another mod already owns the type; logged as a warning, not an error
    pub fn is_collision(&self) -> bool {
        matches!(self, RegistrationError::TypeAlreadyOwned { .. })
    }
}

/// Type-order persistence errors
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("saveOrder: invalid list, expected an array of type names: {0}")]
    InvalidList(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("addon name must not be empty")]
    EmptyAddonName,

    #[error("memory cache capacity must be at least 1")]
    ZeroCacheCapacity,

    #[error("memory cache time-to-idle must be non-zero")]
    ZeroCacheTtl,

    #[error("not-initialized log limit must be at least 1")]
    ZeroLogLimit,

    #[error("could not determine a cache directory; pass one explicitly")]
    NoCacheDir,
}
