//! Per-image getters.
//!
//! A getter resolves one image of one mod to a data URL and remembers the
//! outcome for the rest of the session. Two variants exist:
//! - [`ArchiveImageGetter`]: in-memory cache, then a live archive read
//! - [`StoredImageGetter`]: the persistent image store
//!
//! A failure at the last step marks the getter invalid; it is never retried.

use crate::archive::ModArchive;
use crate::cache::{CachedImage, ImageMemoryCache, ModImageStore};
use crate::diagnostics::Diagnostics;
use crate::paths::extension;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::{Arc, Mutex, MutexGuard};

/// Wrap raw image bytes as `data:image/<ext>;base64,<data>`
pub fn wrap_data_url(file_name: &str, bytes: &[u8]) -> String {
    let ext = extension(file_name).unwrap_or("");
    format!("data:image/{};base64,{}", ext, STANDARD.encode(bytes))
}

/// Resolve-to-payload capability shared by both getter variants
pub trait ImageGetter: Send + Sync {
    /// Data URL of the image, `None` when it cannot be produced
    fn get_base64_image(&self) -> Option<String>;

    /// The image failed to resolve earlier this session
    fn is_invalid(&self) -> bool;

    /// Resolve now and keep the payload on the getter itself
    fn force_cache(&self);

    /// Install a payload resolved by an earlier loader stage
    fn seed(&self, payload: String);
}

#[derive(Debug, Default)]
struct Memo {
    cached: Option<String>,
    invalid: bool,
}

#[derive(Debug, Default)]
struct MemoCell(Mutex<Memo>);

impl MemoCell {
    fn lock(&self) -> MutexGuard<'_, Memo> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Getter reading straight from the mod archive
pub struct ArchiveImageGetter {
    mod_name: String,
    archive: Arc<dyn ModArchive>,
    img_path: String,
    memory: Arc<ImageMemoryCache>,
    diag: Diagnostics,
    memo: MemoCell,
}

impl ArchiveImageGetter {
    pub fn new(
        mod_name: &str,
        archive: Arc<dyn ModArchive>,
        img_path: &str,
        memory: Arc<ImageMemoryCache>,
        diag: Diagnostics,
    ) -> Self {
        Self {
            mod_name: mod_name.to_string(),
            archive,
            img_path: img_path.to_string(),
            memory,
            diag,
            memo: MemoCell::default(),
        }
    }
}

impl ImageGetter for ArchiveImageGetter {
    fn get_base64_image(&self) -> Option<String> {
        let mut memo = self.memo.lock();
        if memo.invalid {
            return None;
        }
        if let Some(cached) = &memo.cached {
            return Some(cached.clone());
        }

        let key = ImageMemoryCache::key(&self.mod_name, &self.img_path);
        match self.memory.get(&key) {
            Some(CachedImage::Valid(data)) => return Some(data.to_string()),
            Some(CachedImage::Invalid) => return None,
            None => {}
        }

        let failure = match self.archive.read(&self.img_path) {
            Ok(Some(bytes)) => {
                let url = wrap_data_url(&self.img_path, &bytes);
                self.memory.insert(key, CachedImage::Valid(Arc::from(url.as_str())));
                return Some(url);
            }
            Ok(None) => "imgFile not found".to_string(),
            Err(e) => format!("imgFile read failed: {:#}", e),
        };

        memo.invalid = true;
        self.memory.insert(key, CachedImage::Invalid);
        self.diag.error(format!(
            "ArchiveImageGetter getBase64Image() {}: {} in {}",
            failure,
            self.img_path,
            self.archive.label()
        ));
        None
    }

    fn is_invalid(&self) -> bool {
        self.memo.lock().invalid
    }

    fn force_cache(&self) {
        let payload = self.get_base64_image();
        self.memo.lock().cached = payload;
    }

    fn seed(&self, payload: String) {
        self.memo.lock().cached = Some(payload);
    }
}

/// Getter reading images streamed into the persistent store.
///
/// Payloads are keyed by archive path, so `real_path` is what gets looked up.
pub struct StoredImageGetter {
    mod_name: String,
    mod_hash: String,
    real_path: String,
    store: Arc<ModImageStore>,
    diag: Diagnostics,
    memo: MemoCell,
}

impl StoredImageGetter {
    pub fn new(
        mod_name: &str,
        mod_hash: &str,
        real_path: &str,
        store: Arc<ModImageStore>,
        diag: Diagnostics,
    ) -> Self {
        Self {
            mod_name: mod_name.to_string(),
            mod_hash: mod_hash.to_string(),
            real_path: real_path.to_string(),
            store,
            diag,
            memo: MemoCell::default(),
        }
    }
}

impl ImageGetter for StoredImageGetter {
    fn get_base64_image(&self) -> Option<String> {
        let mut memo = self.memo.lock();
        if memo.invalid {
            return None;
        }
        if let Some(cached) = &memo.cached {
            return Some(cached.clone());
        }

        let failure = match self.store.get_image(&self.mod_name, &self.mod_hash, &self.real_path) {
            Ok(Some(data)) => {
                memo.cached = Some(data.clone());
                return Some(data);
            }
            Ok(None) => "image not found".to_string(),
            Err(e) => format!("error: {}", e),
        };

        memo.invalid = true;
        self.diag.error(format!(
            "StoredImageGetter getBase64Image() {}: {} in {}",
            failure, self.real_path, self.mod_name
        ));
        None
    }

    fn is_invalid(&self) -> bool {
        self.memo.lock().invalid
    }

    fn force_cache(&self) {
        let payload = self.get_base64_image();
        self.memo.lock().cached = payload;
    }

    fn seed(&self, payload: String) {
        self.memo.lock().cached = Some(payload);
    }
}
