//! Load-session coordinator
//!
//! [`BeautySelector`] owns everything one load session needs: the type
//! registry, the persistent caches, the enabled order and the resolver. The
//! host drives it in three phases:
//! 1. `register_mod` once per mod, sequentially
//! 2. `on_load_end` once every mod is registered
//! 3. `image_getter` / `check_image_exist` / `image_loader` for the rest of
//!    the session

use crate::archive::ModArchive;
use crate::cache::{CachedFileList, ImageMemoryCache, ModImageStore};
use crate::config::AddonConfig;
use crate::diagnostics::{Diagnostics, HostLog};
use crate::error::{ConfigError, OrderError, RegistrationError};
use crate::manifest::ModInfo;
use crate::order::{TypeOrderManager, TypeOrderView};
use crate::registration::{RegistrationEngine, RegistrationReport};
use crate::registry::{TypeOrderEntry, TypeRegistry};
use crate::resolver::{LoadedImage, Resolver};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BeautySelector {
    config: AddonConfig,
    diag: Diagnostics,
    registry: TypeRegistry,
    engine: RegistrationEngine,
    file_list: Arc<CachedFileList>,
    image_store: Arc<ModImageStore>,
    memory: Arc<ImageMemoryCache>,
    order: TypeOrderManager,
    resolver: Resolver,
}

impl BeautySelector {
    pub fn new(config: AddonConfig, host_log: Arc<dyn HostLog>) -> Result<Self, ConfigError> {
        config.validate()?;

        let diag = Diagnostics::new(&config.addon_name, host_log);
        let file_list = Arc::new(CachedFileList::new(&config));
        let image_store = Arc::new(ModImageStore::new(&config));
        let memory = Arc::new(ImageMemoryCache::new(
            config.memory_cache_capacity,
            config.memory_cache_ttl,
        ));
        let engine = RegistrationEngine::new(
            &config.addon_name,
            file_list.clone(),
            image_store.clone(),
            memory.clone(),
            diag.clone(),
        );
        let order = TypeOrderManager::new(&config, diag.clone());
        let resolver = Resolver::new(diag.clone(), config.not_initialized_log_limit);

        Ok(Self {
            config,
            diag,
            registry: TypeRegistry::new(),
            engine,
            file_list,
            image_store,
            memory,
            order,
            resolver,
        })
    }

    /// Register one mod; see [`RegistrationEngine::register_mod`]
    pub fn register_mod(
        &mut self,
        mod_info: &mut ModInfo,
        archive: Arc<dyn ModArchive>,
    ) -> Result<RegistrationReport, RegistrationError> {
        self.engine
            .register_mod(&mut self.registry, mod_info, archive)
    }

    /// Settle the enabled order and prune caches of mods that are gone.
    ///
    /// The file-list cache is closed afterwards; the image store stays open
    /// for store-backed getters until [`shutdown`](Self::shutdown).
    pub fn on_load_end(&mut self) {
        let full = self.registry.full_order();
        self.order.ensure_default(full);
        if let Err(e) = self.order.load_saved_order(full) {
            self.diag.error(format!("loadSavedOrder failed: {}", e));
        }

        let live = self.registry.registered_mods();
        match self.file_list.remove_not_exist_mods(live) {
            Ok(removed) if removed > 0 => info!("Pruned {} cached file lists of removed mods", removed),
            Ok(_) => {}
            Err(e) => warn!("Failed to prune cached file lists: {}", e),
        }
        match self.image_store.remove_not_exist_mod_images(live) {
            Ok(removed) if removed > 0 => info!("Pruned {} stored image rows of removed mods", removed),
            Ok(_) => {}
            Err(e) => warn!("Failed to prune stored images: {}", e),
        }
        self.file_list.close();

        info!(
            "Load finished: {} types from {} mods, {} enabled",
            self.registry.full_order().len(),
            self.registry.registered_mods().len(),
            self.order.used().map(<[TypeOrderEntry]>::len).unwrap_or(0)
        );
    }

    /// Close the persistent stores still open
    pub fn shutdown(&self) {
        self.file_list.close();
        self.image_store.close();
        let (hits, misses) = self.memory.stats();
        info!("Image memory cache: {} hits, {} misses", hits, misses);
    }

    pub fn image_getter(&self, path: &str) -> Option<String> {
        self.resolver.image_getter(self.order.used(), path)
    }

    pub fn check_image_exist(&self, path: &str) -> bool {
        self.resolver.check_image_exist(self.order.used(), path)
    }

    pub fn image_loader<L, S, E>(&self, path: &str, layer: L, on_success: S, on_error: E) -> bool
    where
        S: FnOnce(&str, L, LoadedImage),
        E: FnOnce(&str, L, anyhow::Error),
    {
        self.resolver
            .image_loader(self.order.used(), path, layer, on_success, on_error)
    }

    pub fn save_order(&self, list: &[String]) -> Result<(), OrderError> {
        self.order.save_order(list)
    }

    pub fn save_order_json(&self, value: &Value) -> Result<(), OrderError> {
        self.order.save_order_json(value)
    }

    pub fn set_enabled_order(&mut self, names: &[String]) -> Result<(), OrderError> {
        self.order
            .set_enabled_order(self.registry.full_order(), names)
    }

    /// Re-read the persisted order; see [`TypeOrderManager::load_saved_order`]
    pub fn load_saved_order(&mut self) -> Result<(), OrderError> {
        self.order.load_saved_order(self.registry.full_order())
    }

    pub fn type_order_view(&self) -> TypeOrderView {
        self.order.view(self.registry.full_order())
    }

    pub fn using_type_order(&self) -> Option<Vec<(String, String)>> {
        self.order.using_type_order()
    }

    /// Enabled order, `None` before `on_load_end`
    pub fn enabled_order(&self) -> Option<&[TypeOrderEntry]> {
        self.order.used()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AddonConfig {
        &self.config
    }

    pub fn image_store(&self) -> &ModImageStore {
        &self.image_store
    }

    pub fn file_list_cache(&self) -> &CachedFileList {
        &self.file_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::cache::HandlePhase;
    use crate::config::ADDON_NAME;
    use crate::diagnostics::{LogLevel, RecordingLog, TracingOnly};
    use serde_json::json;

    fn selector() -> BeautySelector {
        BeautySelector::new(AddonConfig::default(), Arc::new(TracingOnly)).unwrap()
    }

    fn flat_mod(name: &str, type_name: &str, files: &[&str]) -> (ModInfo, Arc<dyn ModArchive>) {
        let info = ModInfo::new(name).with_addon(
            ADDON_NAME,
            ADDON_NAME,
            json!({"type": type_name, "imgFileList": files}),
        );
        let archive: Arc<dyn ModArchive> = Arc::new(MemoryArchive::new(
            name,
            files.iter().map(|f| (*f, name.as_bytes().to_vec())),
        ));
        (info, archive)
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AddonConfig {
            not_initialized_log_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            BeautySelector::new(config, Arc::new(TracingOnly)),
            Err(ConfigError::ZeroLogLimit)
        ));
    }

    #[test]
    fn test_host_log_uses_configured_addon_name() {
        let log = Arc::new(RecordingLog::new());
        let config = AddonConfig {
            addon_name: "CustomSelector".to_string(),
            ..Default::default()
        };
        let mut selector = BeautySelector::new(config, log.clone()).unwrap();

        let (mut info, archive) = flat_mod("Alice", "alice", &["img/a.png"]);
        assert!(selector.register_mod(&mut info, archive).is_err());
        assert_eq!(log.count_matching(LogLevel::Error, "[CustomSelector] registerMod"), 1);
    }

    #[test]
    fn test_lookups_before_load_end_miss() {
        let mut selector = selector();
        let (mut info, archive) = flat_mod("Alice", "alice", &["img/a.png"]);
        selector.register_mod(&mut info, archive).unwrap();

        assert!(selector.enabled_order().is_none());
        assert_eq!(selector.image_getter("img/a.png"), None);

        selector.on_load_end();
        assert!(selector.image_getter("img/a.png").is_some());
        assert!(selector.check_image_exist("img/a.png"));
    }

    #[test]
    fn test_load_end_closes_only_file_list_cache() {
        let mut selector = selector();
        selector.on_load_end();
        assert_eq!(selector.file_list_cache().handle().phase(), HandlePhase::Closed);
        assert_ne!(selector.image_store().handle().phase(), HandlePhase::Closed);

        selector.shutdown();
        assert_eq!(selector.image_store().handle().phase(), HandlePhase::Closed);
    }

    #[test]
    fn test_disabling_a_type_hides_its_images() {
        let mut selector = selector();
        for (name, type_name) in [("Alice", "alice"), ("Bob", "bob")] {
            let (mut info, archive) = flat_mod(name, type_name, &["img/a.png"]);
            selector.register_mod(&mut info, archive).unwrap();
        }
        selector.on_load_end();
        assert_eq!(
            selector.image_getter("img/a.png"),
            Some("data:image/png;base64,QWxpY2U=".to_string())
        );

        selector.set_enabled_order(&["bob".to_string()]).unwrap();
        assert_eq!(
            selector.image_getter("img/a.png"),
            Some("data:image/png;base64,Qm9i".to_string())
        );
        let view = selector.type_order_view();
        assert_eq!(view.disabled.len(), 1);
        assert_eq!(view.disabled[0].key, "alice");
    }
}
