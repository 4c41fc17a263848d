//! Persistent and in-memory caches
//!
//! - `file_list`: folder listings per (mod, version, type)
//! - `image_store`: image payloads plus per-type membership
//! - `keyval`: the saved type order
//! - `memory`: bounded cache in front of archive reads
//!
//! All persistent stores are SQLite databases opened lazily through a
//! shared [`StoreHandle`].

mod file_list;
mod handle;
mod image_store;
mod keyval;
mod memory;

pub use file_list::CachedFileList;
pub use handle::{HandlePhase, StoreHandle};
pub use image_store::{ImageStream, ModImageStore, StreamPhase};
pub use keyval::KeyValueStore;
pub use memory::{CachedImage, ImageMemoryCache};

/// Composite record key `mod_version_item`
pub fn composite_key(mod_name: &str, mod_hash: &str, item: &str) -> String {
    format!("{}_{}_{}", mod_name, mod_hash, item)
}
