//! Image lookups from the host's image pipeline
//!
//! The host only asks after its own lookup missed. Types are scanned in the
//! enabled order and the first type holding the path answers, so earlier
//! types shadow later ones.

use crate::diagnostics::Diagnostics;
use crate::registry::{ImageEntry, TypeOrderEntry};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

const NOT_INITIALIZED: &str = "imageGetter typeOrderUsed not set. maybe not init?";

/// A resolved image, ready for the host to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// The data URL it was decoded from
    pub src: String,
    /// e.g. `image/png`
    pub mime: String,
    pub bytes: Vec<u8>,
    /// Width and height, for raster formats the image crate recognizes
    pub dimensions: Option<(u32, u32)>,
}

impl LoadedImage {
    /// Decode a `data:<mime>;base64,<data>` URL
    pub fn from_data_url(src: &str) -> Result<Self> {
        let (header, data) = src.split_once(',').context("data URL has no payload")?;
        let mime = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .context("not a base64 data URL")?;
        let bytes = STANDARD.decode(data).context("invalid base64 payload")?;

        let dimensions = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());

        Ok(Self {
            src: src.to_string(),
            mime: mime.to_string(),
            bytes,
            dimensions,
        })
    }
}

pub struct Resolver {
    diag: Diagnostics,
    log_limit: usize,
    not_initialized: AtomicUsize,
}

impl Resolver {
    pub fn new(diag: Diagnostics, log_limit: usize) -> Self {
        Self {
            diag,
            log_limit,
            not_initialized: AtomicUsize::new(0),
        }
    }

    /// Log a lookup made before the enabled order exists, first few times only
    fn report_not_initialized(&self) {
        let count = self.not_initialized.fetch_add(1, Ordering::Relaxed) + 1;
        if count < self.log_limit {
            self.diag.error(NOT_INITIALIZED);
        } else if count == self.log_limit {
            self.diag.error(NOT_INITIALIZED);
            self.diag
                .error(format!("{} this error will not show again", NOT_INITIALIZED));
        }
    }

    /// Enabled order if lookups can proceed
    fn enabled<'a>(&self, used: Option<&'a [TypeOrderEntry]>) -> Option<&'a [TypeOrderEntry]> {
        match used {
            None => {
                self.report_not_initialized();
                None
            }
            Some([]) => None,
            Some(used) => Some(used),
        }
    }

    /// First enabled type holding `path`
    pub fn find<'a>(&self, used: Option<&'a [TypeOrderEntry]>, path: &str) -> Option<&'a ImageEntry> {
        self.enabled(used)?
            .iter()
            .find_map(|entry| entry.images.get(path))
    }

    /// Data URL of `path`, from the first enabled type declaring it
    pub fn image_getter(&self, used: Option<&[TypeOrderEntry]>, path: &str) -> Option<String> {
        self.find(used, path)?.getter.get_base64_image()
    }

    /// Whether some enabled type can serve `path`.
    ///
    /// Entries whose getter already failed are passed over.
    pub fn check_image_exist(&self, used: Option<&[TypeOrderEntry]>, path: &str) -> bool {
        let Some(used) = self.enabled(used) else {
            return false;
        };
        used.iter()
            .filter_map(|entry| entry.images.get(path))
            .any(|image| !image.getter.is_invalid())
    }

    /// Resolve `path` and hand the decoded image to `on_success`.
    ///
    /// Returns `false` when no enabled type has the image, leaving the host
    /// to its own default; neither continuation runs in that case.
    pub fn image_loader<L, S, E>(
        &self,
        used: Option<&[TypeOrderEntry]>,
        path: &str,
        layer: L,
        on_success: S,
        on_error: E,
    ) -> bool
    where
        S: FnOnce(&str, L, LoadedImage),
        E: FnOnce(&str, L, anyhow::Error),
    {
        let Some(src) = self.image_getter(used, path) else {
            return false;
        };

        match LoadedImage::from_data_url(&src) {
            Ok(image) => on_success(path, layer, image),
            Err(e) => {
                self.diag
                    .error(format!("imageLoader replace error: src[{}] e[{:#}]", path, e));
                on_error(path, layer, e);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MemoryArchive, ModArchive};
    use crate::cache::ImageMemoryCache;
    use crate::config::ADDON_NAME;
    use crate::diagnostics::{LogLevel, RecordingLog};
    use crate::getter::{wrap_data_url, ArchiveImageGetter, ImageGetter};
    use crate::registry::{ImageMap, ModRegistration, TypeRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    /// 1x1 transparent PNG
    const PIXEL_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn install(registry: &mut TypeRegistry, mod_name: &str, type_name: &str, files: &[(&str, &[u8])]) {
        let archive: Arc<dyn ModArchive> = Arc::new(MemoryArchive::new(
            mod_name,
            files.iter().map(|(p, d)| (*p, d.to_vec())),
        ));
        let memory = Arc::new(ImageMemoryCache::new(30, Duration::from_secs(60)));
        let images: ImageMap = files
            .iter()
            .map(|(path, _)| {
                let getter: Arc<dyn ImageGetter> = Arc::new(ArchiveImageGetter::new(
                    mod_name,
                    archive.clone(),
                    path,
                    memory.clone(),
                    Diagnostics::tracing_only(),
                ));
                let entry = ImageEntry {
                    path: path.to_string(),
                    real_path: path.to_string(),
                    getter,
                };
                (path.to_string(), entry)
            })
            .collect();
        let built = vec![(type_name.to_string(), images)];
        registry.install(Arc::new(ModRegistration::new(mod_name, archive, built)));
    }

    fn two_mods() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        install(&mut registry, "Alice", "alice", &[("img/a.png", &b"ALICE"[..])]);
        install(
            &mut registry,
            "Bob",
            "bob",
            &[("img/a.png", &b"BOB"[..]), ("img/b.png", &b"B"[..])],
        );
        registry
    }

    #[test]
    fn test_first_enabled_type_shadows_later_ones() {
        let registry = two_mods();
        let resolver = Resolver::new(Diagnostics::tracing_only(), 10);
        let used = Some(registry.full_order());

        assert_eq!(
            resolver.image_getter(used, "img/a.png"),
            Some(wrap_data_url("img/a.png", &b"ALICE"[..]))
        );
        assert_eq!(
            resolver.image_getter(used, "img/b.png"),
            Some(wrap_data_url("img/b.png", b"B"))
        );

        let reversed: Vec<TypeOrderEntry> = registry.full_order().iter().rev().cloned().collect();
        assert_eq!(
            resolver.image_getter(Some(reversed.as_slice()), "img/a.png"),
            Some(wrap_data_url("img/a.png", b"BOB"))
        );
    }

    #[test]
    fn test_missing_path_and_empty_order() {
        let registry = two_mods();
        let log = Arc::new(RecordingLog::new());
        let resolver = Resolver::new(Diagnostics::new(ADDON_NAME, log.clone()), 10);

        assert_eq!(resolver.image_getter(Some(registry.full_order()), "img/zzz.png"), None);
        assert_eq!(resolver.image_getter(Some(&[][..]), "img/a.png"), None);
        assert!(!resolver.check_image_exist(Some(&[][..]), "img/a.png"));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_not_initialized_logs_are_rate_limited() {
        let log = Arc::new(RecordingLog::new());
        let resolver = Resolver::new(Diagnostics::new(ADDON_NAME, log.clone()), 10);

        for _ in 0..25 {
            assert_eq!(resolver.image_getter(None, "img/a.png"), None);
            assert!(!resolver.check_image_exist(None, "img/a.png"));
        }
        assert_eq!(log.count_matching(LogLevel::Error, "maybe not init"), 11);
        assert_eq!(log.count_matching(LogLevel::Error, "will not show again"), 1);
    }

    #[test]
    fn test_check_image_exist_skips_invalid_getters() {
        let mut registry = TypeRegistry::new();
        install(&mut registry, "Alice", "alice", &[("img/a.png", &b"A"[..])]);
        // Bob declares the path but the archive read will fail
        let archive: Arc<dyn ModArchive> =
            Arc::new(MemoryArchive::new("Bob", Vec::<(&str, Vec<u8>)>::new()));
        let getter: Arc<dyn ImageGetter> = Arc::new(ArchiveImageGetter::new(
            "Bob",
            archive.clone(),
            "img/a.png",
            Arc::new(ImageMemoryCache::new(30, Duration::from_secs(60))),
            Diagnostics::tracing_only(),
        ));
        let images: ImageMap = [(
            "img/a.png".to_string(),
            ImageEntry {
                path: "img/a.png".into(),
                real_path: "img/a.png".into(),
                getter: getter.clone(),
            },
        )]
        .into_iter()
        .collect();
        registry.install(Arc::new(ModRegistration::new(
            "Bob",
            archive,
            vec![("bob".to_string(), images)],
        )));

        let bob_first: Vec<TypeOrderEntry> = registry.full_order().iter().rev().cloned().collect();
        let resolver = Resolver::new(Diagnostics::tracing_only(), 10);

        assert!(resolver.check_image_exist(Some(bob_first.as_slice()), "img/a.png"));
        assert_eq!(resolver.image_getter(Some(bob_first.as_slice()), "img/a.png"), None);
        assert!(getter.is_invalid());
        // Alice still serves it
        assert!(resolver.check_image_exist(Some(bob_first.as_slice()), "img/a.png"));
        assert!(!resolver.check_image_exist(Some(&bob_first[..1]), "img/a.png"));
    }

    #[test]
    fn test_image_loader_continuations() {
        let mut registry = TypeRegistry::new();
        install(
            &mut registry,
            "Alice",
            "alice",
            &[("img/pixel.png", PIXEL_PNG), ("img/broken.png", &b"nope"[..])],
        );
        let resolver = Resolver::new(Diagnostics::tracing_only(), 10);
        let used = Some(registry.full_order());

        let mut loaded = None;
        let handled = resolver.image_loader(
            used,
            "img/pixel.png",
            7u32,
            |_, layer, image| loaded = Some((layer, image)),
            |_, _, e| panic!("unexpected error: {e}"),
        );
        assert!(handled);
        let (layer, image) = loaded.unwrap();
        assert_eq!(layer, 7);
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, PIXEL_PNG);
        assert_eq!(image.dimensions, Some((1, 1)));

        // not a decodable png, but still a payload
        let mut loaded = None;
        assert!(resolver.image_loader(
            used,
            "img/broken.png",
            (),
            |_, _, image| loaded = Some(image),
            |_, _, _| panic!("bytes are valid base64"),
        ));
        assert_eq!(loaded.and_then(|i| i.dimensions), None);

        let mut called = false;
        assert!(!resolver.image_loader(
            used,
            "img/none.png",
            (),
            |_, _, _| called = true,
            |_, _, _| panic!("no payload must not be an error"),
        ));
        assert!(!called);
    }

    #[test]
    fn test_invalid_data_url() {
        assert!(LoadedImage::from_data_url("data:image/png;base64,@@@").is_err());
        assert!(LoadedImage::from_data_url("no-comma").is_err());
        assert!(LoadedImage::from_data_url("data:image/png,AAAA").is_err());
    }
}
