//! Enabled type order
//!
//! The full order is every registered type in registration order. The
//! enabled order is the player's chosen subset and sequence, persisted as a
//! JSON array of type names in the key-value store. A saved order naming a
//! type that no longer exists is discarded and overwritten with the full
//! order.

use crate::cache::KeyValueStore;
use crate::config::AddonConfig;
use crate::diagnostics::Diagnostics;
use crate::error::OrderError;
use crate::registry::TypeOrderEntry;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error};

/// One row of the reorder UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeOrderItem {
    pub key: String,
    pub label: String,
}

impl From<&TypeOrderEntry> for TypeOrderItem {
    fn from(entry: &TypeOrderEntry) -> Self {
        Self {
            key: entry.type_name.clone(),
            label: entry.label(),
        }
    }
}

/// What the reorder UI shows: enabled types in order, then the rest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeOrderView {
    pub enabled: Vec<TypeOrderItem>,
    pub disabled: Vec<TypeOrderItem>,
}

pub struct TypeOrderManager {
    store: KeyValueStore,
    save_key: String,
    used: Option<Vec<TypeOrderEntry>>,
    diag: Diagnostics,
}

impl TypeOrderManager {
    pub fn new(config: &AddonConfig, diag: Diagnostics) -> Self {
        Self {
            store: KeyValueStore::new(config.storage.clone(), config.order_db_name()),
            save_key: config.order_save_key(),
            used: None,
            diag,
        }
    }

    /// Enabled order, `None` until load completes
    pub fn used(&self) -> Option<&[TypeOrderEntry]> {
        self.used.as_deref()
    }

    /// Enable every type unless an order was already chosen
    pub fn ensure_default(&mut self, full: &[TypeOrderEntry]) {
        if self.used.is_none() {
            self.used = Some(full.to_vec());
        }
    }

    /// Adopt the persisted order when every name in it still exists.
    ///
    /// Nothing saved, or a saved value that is not a string array, leaves the
    /// current order alone. A stale save is replaced by the full order.
    pub fn load_saved_order(&mut self, full: &[TypeOrderEntry]) -> Result<(), OrderError> {
        let Some(raw) = self.store.get(&self.save_key)? else {
            return Ok(());
        };
        let list = match serde_json::from_str::<Value>(&raw).ok().and_then(|v| string_list(&v)) {
            Some(list) => list,
            None => {
                error!("loadSavedOrder: saved order is not a string array: {}", raw);
                return Ok(());
            }
        };

        let by_name: HashMap<&str, &TypeOrderEntry> =
            full.iter().map(|e| (e.type_name.as_str(), e)).collect();
        let unknown: Vec<&String> = list
            .iter()
            .filter(|name| !by_name.contains_key(name.as_str()))
            .collect();

        if unknown.is_empty() {
            debug!("loadSavedOrder: ok {:?}", list);
            self.used = Some(list.iter().map(|name| by_name[name.as_str()].clone()).collect());
        } else {
            self.diag.info(format!(
                "loadSavedOrder: some type not found, reset. unknown {:?}",
                unknown
            ));
            let names: Vec<String> = full.iter().map(|e| e.type_name.clone()).collect();
            self.save_order(&names)?;
            self.used = Some(full.to_vec());
        }
        Ok(())
    }

    /// Persist an order of type names
    pub fn save_order(&self, list: &[String]) -> Result<(), OrderError> {
        let json = serde_json::to_string(list).map_err(|e| OrderError::InvalidList(e.to_string()))?;
        self.store.set(&self.save_key, &json)?;
        Ok(())
    }

    /// Persist an order received as raw JSON; anything but a string array is rejected
    pub fn save_order_json(&self, value: &Value) -> Result<(), OrderError> {
        let list = string_list(value).ok_or_else(|| OrderError::InvalidList(value.to_string()))?;
        self.save_order(&list)
    }

    /// Adopt the order chosen in the reorder UI and persist it.
    ///
    /// Unknown and repeated names are dropped.
    pub fn set_enabled_order(
        &mut self,
        full: &[TypeOrderEntry],
        names: &[String],
    ) -> Result<(), OrderError> {
        let mut seen = HashSet::new();
        let used: Vec<TypeOrderEntry> = names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| full.iter().find(|e| &e.type_name == name).cloned())
            .collect();

        let saved: Vec<String> = used.iter().map(|e| e.type_name.clone()).collect();
        self.used = Some(used);
        self.save_order(&saved)
    }

    /// Enabled and disabled lists for the reorder UI
    pub fn view(&self, full: &[TypeOrderEntry]) -> TypeOrderView {
        let used = self.used.as_deref().unwrap_or_default();
        let enabled_names: HashSet<&str> = used.iter().map(|e| e.type_name.as_str()).collect();
        TypeOrderView {
            enabled: used.iter().map(TypeOrderItem::from).collect(),
            disabled: full
                .iter()
                .filter(|e| !enabled_names.contains(e.type_name.as_str()))
                .map(TypeOrderItem::from)
                .collect(),
        }
    }

    /// `(type, mod)` pairs of the enabled order
    pub fn using_type_order(&self) -> Option<Vec<(String, String)>> {
        self.used.as_ref().map(|used| {
            used.iter()
                .map(|e| (e.type_name.clone(), e.owner.name.clone()))
                .collect()
        })
    }

    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MemoryArchive, ModArchive};
    use crate::registry::{ImageMap, ModRegistration, TypeRegistry};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn registry(types: &[(&str, &str)]) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        for (mod_name, type_name) in types {
            let archive: Arc<dyn ModArchive> =
                Arc::new(MemoryArchive::new(*mod_name, Vec::<(&str, Vec<u8>)>::new()));
            let built = vec![(type_name.to_string(), ImageMap::new())];
            registry.install(Arc::new(ModRegistration::new(mod_name, archive, built)));
        }
        registry
    }

    fn names(order: Option<&[TypeOrderEntry]>) -> Vec<String> {
        order
            .unwrap_or_default()
            .iter()
            .map(|e| e.type_name.clone())
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_to_full_order() -> anyhow::Result<()> {
        let registry = registry(&[("A", "a"), ("B", "b")]);
        let mut order = TypeOrderManager::new(&AddonConfig::default(), Diagnostics::tracing_only());
        assert!(order.used().is_none());

        order.ensure_default(registry.full_order());
        order.load_saved_order(registry.full_order())?;
        assert_eq!(names(order.used()), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_save_then_load_is_idempotent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let config = AddonConfig::in_directory(dir.path());
        let registry = registry(&[("A", "a"), ("B", "b"), ("C", "c")]);

        let order = TypeOrderManager::new(&config, Diagnostics::tracing_only());
        order.save_order(&strings(&["c", "a"]))?;

        let mut reloaded = TypeOrderManager::new(&config, Diagnostics::tracing_only());
        reloaded.ensure_default(registry.full_order());
        reloaded.load_saved_order(registry.full_order())?;
        assert_eq!(names(reloaded.used()), vec!["c", "a"]);

        reloaded.save_order(&names(reloaded.used()))?;
        reloaded.load_saved_order(registry.full_order())?;
        assert_eq!(names(reloaded.used()), vec!["c", "a"]);
        Ok(())
    }

    #[test]
    fn test_stale_save_resets_to_full_order() -> anyhow::Result<()> {
        let registry = registry(&[("A", "a"), ("B", "b")]);
        let mut order = TypeOrderManager::new(&AddonConfig::default(), Diagnostics::tracing_only());
        order.save_order(&strings(&["b", "removed"]))?;

        order.ensure_default(registry.full_order());
        order.load_saved_order(registry.full_order())?;

        assert_eq!(names(order.used()), vec!["a", "b"]);
        let saved = order.store().get(&AddonConfig::default().order_save_key())?;
        assert_eq!(saved.as_deref(), Some(r#"["a","b"]"#));
        Ok(())
    }

    #[test]
    fn test_corrupt_save_is_ignored() -> anyhow::Result<()> {
        let registry = registry(&[("A", "a")]);
        let mut order = TypeOrderManager::new(&AddonConfig::default(), Diagnostics::tracing_only());
        order
            .store()
            .set(&AddonConfig::default().order_save_key(), "{oops")?;

        order.ensure_default(registry.full_order());
        order.load_saved_order(registry.full_order())?;
        assert_eq!(names(order.used()), vec!["a"]);
        Ok(())
    }

    #[test]
    fn test_save_order_json_rejects_non_string_arrays() {
        let order = TypeOrderManager::new(&AddonConfig::default(), Diagnostics::tracing_only());
        assert!(order.save_order_json(&json!(["a", "b"])).is_ok());
        assert!(matches!(
            order.save_order_json(&json!(["a", 1])),
            Err(OrderError::InvalidList(_))
        ));
        assert!(matches!(
            order.save_order_json(&json!({"a": 1})),
            Err(OrderError::InvalidList(_))
        ));
    }

    #[test]
    fn test_set_enabled_order_and_view() -> anyhow::Result<()> {
        let registry = registry(&[("A", "a"), ("B", "b"), ("C", "c")]);
        let mut order = TypeOrderManager::new(&AddonConfig::default(), Diagnostics::tracing_only());

        order.set_enabled_order(registry.full_order(), &strings(&["c", "ghost", "a", "c"]))?;
        assert_eq!(names(order.used()), vec!["c", "a"]);

        let view = order.view(registry.full_order());
        assert_eq!(
            view.enabled,
            vec![
                TypeOrderItem { key: "c".into(), label: "[C] c".into() },
                TypeOrderItem { key: "a".into(), label: "[A] a".into() },
            ]
        );
        assert_eq!(view.disabled.len(), 1);
        assert_eq!(view.disabled[0].key, "b");

        assert_eq!(
            order.using_type_order(),
            Some(vec![("c".to_string(), "C".to_string()), ("a".to_string(), "A".to_string())])
        );
        Ok(())
    }
}
