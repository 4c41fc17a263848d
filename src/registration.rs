//! Mod registration.
//!
//! Turns one mod's declared params into installed types:
//! 1. find this add-on's block in the manifest
//! 2. purge cache rows left by an older version of the same mod
//! 3. classify the params and build one image map per declared type
//! 4. install what was built into the [`TypeRegistry`]
//!
//! A rejected type never stops its siblings or the overall load. Every
//! rejection is logged on both channels and listed in the returned
//! [`RegistrationReport`].

use crate::archive::ModArchive;
use crate::cache::{CachedFileList, ImageMemoryCache, ImageStream, ModImageStore};
use crate::diagnostics::Diagnostics;
use crate::error::{RegistrationError, StoreError};
use crate::getter::{wrap_data_url, ArchiveImageGetter, ImageGetter, StoredImageGetter};
use crate::manifest::ModInfo;
use crate::params::{AddonParams, TypeItem};
use crate::paths::{dir_of, folder_prefix, to_archive_path};
use crate::registry::{ImageEntry, ImageMap, ModRegistration, TypeRegistry};
use crate::traverse::{traverse_archive, ArchiveFileRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of registering one mod
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub mod_name: String,
    /// Types installed, in order
    pub installed: Vec<String>,
    /// Types that were skipped, with the reason
    pub rejected: Vec<RegistrationError>,
    /// Registered through the converted shape
    pub converted: bool,
}

impl RegistrationReport {
    fn new(mod_name: &str) -> Self {
        Self {
            mod_name: mod_name.to_string(),
            ..Default::default()
        }
    }
}

/// Builds types from mod declarations
pub struct RegistrationEngine {
    addon_name: String,
    file_list: Arc<CachedFileList>,
    image_store: Arc<ModImageStore>,
    memory: Arc<ImageMemoryCache>,
    diag: Diagnostics,
}

impl RegistrationEngine {
    pub fn new(
        addon_name: &str,
        file_list: Arc<CachedFileList>,
        image_store: Arc<ModImageStore>,
        memory: Arc<ImageMemoryCache>,
        diag: Diagnostics,
    ) -> Self {
        Self {
            addon_name: addon_name.to_string(),
            file_list,
            image_store,
            memory,
            diag,
        }
    }

    /// Register one mod.
    ///
    /// `Err` means the whole mod was rejected; per-type rejections are in the
    /// report. Both are already logged when this returns.
    pub fn register_mod(
        &self,
        registry: &mut TypeRegistry,
        mod_info: &mut ModInfo,
        archive: Arc<dyn ModArchive>,
    ) -> Result<RegistrationReport, RegistrationError> {
        let mod_name = mod_info.name.clone();

        let Some(params) = mod_info.addon_params(&self.addon_name).cloned() else {
            return Err(self.reject(RegistrationError::MissingAddonConfig { mod_name }));
        };

        let mod_hash = archive.version_hash().to_string();
        self.purge_changed(&mod_name, &mod_hash);

        let Some(shape) = AddonParams::classify(&params) else {
            return Err(self.reject(RegistrationError::InvalidParams { mod_name }));
        };

        let mut report = RegistrationReport::new(&mod_name);
        let built = match shape {
            AddonParams::Converted { type_name } => {
                let type_name = AddonParams::converted_type_name(type_name.as_deref(), &mod_name);
                match self.check_owner(registry, &[], &mod_name, &type_name) {
                    Ok(()) => {
                        report.converted = true;
                        vec![(type_name, self.converted_images(mod_info, &archive))]
                    }
                    Err(e) => {
                        report.rejected.push(self.reject(e));
                        Vec::new()
                    }
                }
            }
            AddonParams::FlatList { type_name, files } => {
                match self.check_owner(registry, &[], &mod_name, &type_name) {
                    Ok(()) => vec![(type_name, self.archive_images(&mod_name, &archive, &files, ""))],
                    Err(e) => {
                        report.rejected.push(self.reject(e));
                        Vec::new()
                    }
                }
            }
            AddonParams::MultiType { items } => {
                let unique: HashSet<&str> = items.iter().map(TypeItem::type_name).collect();
                if unique.len() != items.len() {
                    return Err(self.reject(RegistrationError::DuplicateTypeInDeclaration {
                        mod_name,
                    }));
                }

                let mut built: Vec<(String, ImageMap)> = Vec::new();
                for item in &items {
                    let pending: Vec<&str> = built.iter().map(|(t, _)| t.as_str()).collect();
                    let result = self
                        .check_owner(registry, &pending, &mod_name, item.type_name())
                        .and_then(|()| self.build_item(&mod_name, &mod_hash, &archive, item));
                    match result {
                        Ok(images) => built.push((item.type_name().to_string(), images)),
                        Err(e) => report.rejected.push(self.reject(e)),
                    }
                }
                built
            }
        };

        if built.is_empty() {
            return Ok(report);
        }

        let registration = Arc::new(ModRegistration::new(&mod_name, archive, built));
        registry.install(registration.clone());
        report.installed = registration.types.clone();

        if report.converted {
            registry.mark_converted(&mod_name);
            self.diag.info(format!("converted Mod ok. [{}]", mod_name));
        } else {
            info!(
                "Registered mod [{}] version [{}] types {:?}",
                mod_name, mod_info.version, report.installed
            );
        }
        Ok(report)
    }

    /// Log a rejection on both channels and hand it back
    fn reject(&self, error: RegistrationError) -> RegistrationError {
        let message = format!("registerMod: {}", error);
        if error.is_collision() {
            self.diag.warn(message);
        } else {
            self.diag.error(message);
        }
        error
    }

    /// Delete cache rows recorded under a different version of this mod
    fn purge_changed(&self, mod_name: &str, mod_hash: &str) {
        if let Err(e) = self.file_list.remove_changed_mod(mod_name, mod_hash) {
            warn!("Failed to prune file lists of [{}]: {}", mod_name, e);
        }
        if let Err(e) = self.image_store.remove_changed_mod_images(mod_name, mod_hash) {
            warn!("Failed to prune stored images of [{}]: {}", mod_name, e);
        }
    }

    /// Reject a type owned by another mod or already built for this one
    fn check_owner(
        &self,
        registry: &TypeRegistry,
        pending: &[&str],
        mod_name: &str,
        type_name: &str,
    ) -> Result<(), RegistrationError> {
        let owner = registry
            .owner_of(type_name)
            .map(|owner| owner.name.clone())
            .or_else(|| pending.contains(&type_name).then(|| mod_name.to_string()));

        match owner {
            Some(owner) => Err(RegistrationError::TypeAlreadyOwned {
                type_name: type_name.to_string(),
                owner,
                mod_name: mod_name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn archive_getter(
        &self,
        mod_name: &str,
        archive: &Arc<dyn ModArchive>,
        real_path: &str,
    ) -> ArchiveImageGetter {
        ArchiveImageGetter::new(
            mod_name,
            archive.clone(),
            real_path,
            self.memory.clone(),
            self.diag.clone(),
        )
    }

    /// Take over the mod's own image list, keeping payloads it already resolved
    fn converted_images(&self, mod_info: &mut ModInfo, archive: &Arc<dyn ModArchive>) -> ImageMap {
        std::mem::take(&mut mod_info.imgs)
            .into_iter()
            .map(|img| {
                let getter = self.archive_getter(&mod_info.name, archive, &img.path);
                if let Some(cached) = img.cached {
                    getter.seed(cached);
                }
                let entry = ImageEntry {
                    path: img.path.clone(),
                    real_path: img.path.clone(),
                    getter: Arc::new(getter),
                };
                (img.path, entry)
            })
            .collect()
    }

    /// Archive-backed images at `base_dir + path`, keyed by `path`
    fn archive_images(
        &self,
        mod_name: &str,
        archive: &Arc<dyn ModArchive>,
        files: &[String],
        base_dir: &str,
    ) -> ImageMap {
        files
            .iter()
            .map(|path| {
                let real_path = format!("{}{}", base_dir, to_archive_path(path));
                let entry = ImageEntry {
                    path: path.clone(),
                    getter: Arc::new(self.archive_getter(mod_name, archive, &real_path)),
                    real_path,
                };
                (path.clone(), entry)
            })
            .collect()
    }

    fn build_item(
        &self,
        mod_name: &str,
        mod_hash: &str,
        archive: &Arc<dyn ModArchive>,
        item: &TypeItem,
    ) -> Result<ImageMap, RegistrationError> {
        match item {
            TypeItem::FileListFile { type_name, file } => {
                let files = self.read_file_list(mod_name, archive.as_ref(), type_name, file)?;
                Ok(self.archive_images(mod_name, archive, &files, &dir_of(file)))
            }
            TypeItem::ImageDir { type_name, dir } => {
                self.image_dir(mod_name, mod_hash, archive.as_ref(), type_name, dir)
            }
        }
    }

    /// Read and validate a JSON string array stored inside the archive
    fn read_file_list(
        &self,
        mod_name: &str,
        archive: &dyn ModArchive,
        type_name: &str,
        file: &str,
    ) -> Result<Vec<String>, RegistrationError> {
        let missing = || RegistrationError::FileListMissing {
            mod_name: mod_name.to_string(),
            type_name: type_name.to_string(),
            file: file.to_string(),
        };

        let text = match archive.read_string(&to_archive_path(file)) {
            Ok(Some(text)) => text,
            Ok(None) => return Err(missing()),
            Err(e) => {
                warn!("Reading {} from {} failed: {:#}", file, archive.label(), e);
                return Err(missing());
            }
        };

        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|_| RegistrationError::FileListInvalidJson {
                mod_name: mod_name.to_string(),
                type_name: type_name.to_string(),
                file: file.to_string(),
            })?;

        value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| RegistrationError::FileListNotStringArray {
                mod_name: mod_name.to_string(),
                type_name: type_name.to_string(),
                file: file.to_string(),
            })
    }

    /// Store-backed images of every image file under `dir`
    fn image_dir(
        &self,
        mod_name: &str,
        mod_hash: &str,
        archive: &dyn ModArchive,
        type_name: &str,
        dir: &str,
    ) -> Result<ImageMap, RegistrationError> {
        let storage = |message: String| RegistrationError::Storage {
            mod_name: mod_name.to_string(),
            type_name: type_name.to_string(),
            message,
        };

        let already_stored = self
            .image_store
            .has_stored_images(mod_name, mod_hash, type_name)
            .map_err(|e| storage(e.to_string()))?;

        let paths = if already_stored {
            self.stored_paths(mod_name, mod_hash, type_name)
                .map_err(|e| storage(e.to_string()))?
        } else {
            match self.stream_dir(mod_name, mod_hash, archive, type_name, dir) {
                Ok(paths) => paths,
                Err(e) if matches!(e.downcast_ref::<StoreError>(), Some(StoreError::AlreadyStored { .. })) => {
                    // another registration stored this triple first
                    debug!("Images of [{}] [{}] stored concurrently", mod_name, type_name);
                    self.stored_paths(mod_name, mod_hash, type_name)
                        .map_err(|e| storage(e.to_string()))?
                }
                Err(e) => return Err(storage(format!("{:#}", e))),
            }
        };

        let prefix = folder_prefix(dir);
        Ok(paths
            .into_iter()
            .map(|path| {
                let real_path = format!("{}{}", prefix, path);
                let getter = StoredImageGetter::new(
                    mod_name,
                    mod_hash,
                    &real_path,
                    self.image_store.clone(),
                    self.diag.clone(),
                );
                let entry = ImageEntry {
                    real_path,
                    path: path.clone(),
                    getter: Arc::new(getter),
                };
                (path, entry)
            })
            .collect())
    }

    fn stored_paths(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .image_store
            .get_image_paths(mod_name, mod_hash, type_name)?
            .unwrap_or_default())
    }

    /// Stream every image under `dir` into the image store.
    ///
    /// A cached listing for this version skips the traversal; otherwise the
    /// archive is traversed once, storing images as they are found, and the
    /// listing is cached for the next session.
    fn stream_dir(
        &self,
        mod_name: &str,
        mod_hash: &str,
        archive: &dyn ModArchive,
        type_name: &str,
        dir: &str,
    ) -> anyhow::Result<Vec<String>> {
        let mut stream = self.image_store.open_stream(mod_name, mod_hash, type_name)?;

        let cached = self
            .file_list
            .get(mod_name, mod_hash, type_name)
            .unwrap_or_else(|e| {
                warn!("File list cache unavailable for [{}]: {}", mod_name, e);
                None
            });

        match cached {
            Some(listing) => {
                debug!(
                    "Using cached file list for [{}] [{}], {} entries",
                    mod_name,
                    type_name,
                    listing.len()
                );
                for record in listing.iter().filter(|r| r.is_special_image()) {
                    self.stream_image(&mut stream, archive, record)?;
                }
            }
            None => {
                let entries = archive.entries();
                let listing = traverse_archive(
                    &entries,
                    dir,
                    Some(|record: &ArchiveFileRecord| -> anyhow::Result<()> {
                        self.stream_image(&mut stream, archive, record)?;
                        Ok(())
                    }),
                )?;

                let files: Vec<ArchiveFileRecord> =
                    listing.into_iter().filter(|r| r.is_file).collect();
                if let Err(e) = self.file_list.write_if_absent(mod_name, mod_hash, type_name, &files) {
                    warn!("Failed to cache file list for [{}] [{}]: {}", mod_name, type_name, e);
                }
            }
        }

        Ok(stream.finalize()?)
    }

    /// Store one image; an unreadable image is logged and skipped
    fn stream_image(
        &self,
        stream: &mut ImageStream<'_>,
        archive: &dyn ModArchive,
        record: &ArchiveFileRecord,
    ) -> Result<(), StoreError> {
        let Some(image_path) = record.path_in_special_folder.as_deref() else {
            return Ok(());
        };

        match archive.read(&record.path_in_archive) {
            Ok(Some(bytes)) => {
                let data = wrap_data_url(&record.path_in_archive, &bytes);
                stream.store_image(image_path, &record.path_in_archive, &data)
            }
            Ok(None) => {
                warn!("Image {} listed but missing in {}", record.path_in_archive, archive.label());
                Ok(())
            }
            Err(e) => {
                warn!("Failed to read {} from {}: {:#}", record.path_in_archive, archive.label(), e);
                Ok(())
            }
        }
    }
}
