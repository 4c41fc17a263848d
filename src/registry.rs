//! Registered mods and the global type table
//!
//! One [`TypeRegistry`] exists per load session, owned by the
//! [`BeautySelector`](crate::addon::BeautySelector) coordinator. A type name
//! has exactly one owner; the first mod to install it keeps it.

use crate::archive::ModArchive;
use crate::getter::ImageGetter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One image a type can serve
#[derive(Clone)]
pub struct ImageEntry {
    /// Path the host engine asks for
    pub path: String,
    /// Where the image lives inside the archive
    pub real_path: String,
    pub getter: Arc<dyn ImageGetter>,
}

impl std::fmt::Debug for ImageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEntry")
            .field("path", &self.path)
            .field("real_path", &self.real_path)
            .field("invalid", &self.getter.is_invalid())
            .finish()
    }
}

/// Images of one type keyed by public path
pub type ImageMap = HashMap<String, ImageEntry>;

/// A mod that installed at least one type. Immutable once built.
pub struct ModRegistration {
    pub name: String,
    pub archive: Arc<dyn ModArchive>,
    /// Installed types in declaration order
    pub types: Vec<String>,
    pub type_images: HashMap<String, Arc<ImageMap>>,
}

impl ModRegistration {
    /// Build a registration from its types, in install order
    pub fn new(name: &str, archive: Arc<dyn ModArchive>, built: Vec<(String, ImageMap)>) -> Self {
        let mut types = Vec::with_capacity(built.len());
        let mut type_images = HashMap::with_capacity(built.len());
        for (type_name, images) in built {
            types.push(type_name.clone());
            type_images.insert(type_name, Arc::new(images));
        }
        Self {
            name: name.to_string(),
            archive,
            types,
            type_images,
        }
    }
}

impl std::fmt::Debug for ModRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModRegistration")
            .field("name", &self.name)
            .field("archive", &self.archive.label())
            .field("types", &self.types)
            .finish()
    }
}

/// A type in the full or enabled order
#[derive(Debug, Clone)]
pub struct TypeOrderEntry {
    pub type_name: String,
    pub owner: Arc<ModRegistration>,
    pub images: Arc<ImageMap>,
}

impl TypeOrderEntry {
    /// Label shown by the reorder UI: `[mod] type`
    pub fn label(&self) -> String {
        format!("[{}] {}", self.owner.name, self.type_name)
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    table: HashMap<String, Arc<ModRegistration>>,
    full_order: Vec<TypeOrderEntry>,
    registered_mods: HashSet<String>,
    converted_mods: Vec<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mod owning `type_name`
    pub fn owner_of(&self, type_name: &str) -> Option<&Arc<ModRegistration>> {
        self.table.get(type_name)
    }

    /// Append every type of `registration` to the table and the full order.
    ///
    /// Callers check ownership first; a type that is somehow already owned
    /// is skipped so the first owner stays.
    pub fn install(&mut self, registration: Arc<ModRegistration>) -> usize {
        let mut installed = 0;
        for type_name in &registration.types {
            if self.table.contains_key(type_name) {
                continue;
            }
            let Some(images) = registration.type_images.get(type_name) else {
                continue;
            };
            self.table.insert(type_name.clone(), registration.clone());
            self.full_order.push(TypeOrderEntry {
                type_name: type_name.clone(),
                owner: registration.clone(),
                images: images.clone(),
            });
            installed += 1;
        }
        if installed > 0 {
            self.registered_mods.insert(registration.name.clone());
        }
        installed
    }

    /// Record a mod registered through the converted shape
    pub fn mark_converted(&mut self, mod_name: &str) {
        self.converted_mods.push(mod_name.to_string());
    }

    /// All types in registration order
    pub fn full_order(&self) -> &[TypeOrderEntry] {
        &self.full_order
    }

    pub fn entry(&self, type_name: &str) -> Option<&TypeOrderEntry> {
        self.full_order.iter().find(|e| e.type_name == type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.full_order.iter().map(|e| e.type_name.clone()).collect()
    }

    /// Mods that installed at least one type this session
    pub fn registered_mods(&self) -> &HashSet<String> {
        &self.registered_mods
    }

    pub fn converted_mods(&self) -> &[String] {
        &self.converted_mods
    }
}
