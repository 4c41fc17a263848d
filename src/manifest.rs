//! Mod manifest (`boot.json`) model
//!
//! Only the fields this add-on reads are modelled; everything else in the
//! manifest is ignored.

use crate::archive::ModArchive;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manifest file at the archive root
pub const BOOT_JSON: &str = "boot.json";

/// An add-on config block declared by a mod
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonPluginDecl {
    /// Mod that provides the add-on
    pub mod_name: String,
    /// Add-on inside that mod
    pub addon_name: String,
    /// Add-on specific parameters, shape decided by the add-on
    #[serde(default)]
    pub params: Value,
}

/// An image the mod loader already knows about for this mod
#[derive(Debug, Clone)]
pub struct ModImage {
    pub path: String,
    /// Payload resolved by an earlier loader stage, if any
    pub cached: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootJson {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    img_file_list: Vec<String>,
    #[serde(default)]
    addon_plugin: Vec<AddonPluginDecl>,
}

/// Mod identity plus the parts of its manifest this add-on consumes
#[derive(Debug, Clone)]
pub struct ModInfo {
    pub name: String,
    pub version: String,
    pub addon_plugins: Vec<AddonPluginDecl>,
    pub imgs: Vec<ModImage>,
}

impl ModInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            addon_plugins: Vec::new(),
            imgs: Vec::new(),
        }
    }

    /// Attach an add-on config block
    pub fn with_addon(mut self, mod_name: &str, addon_name: &str, params: Value) -> Self {
        self.addon_plugins.push(AddonPluginDecl {
            mod_name: mod_name.to_string(),
            addon_name: addon_name.to_string(),
            params,
        });
        self
    }

    /// Attach pre-declared images
    pub fn with_images<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imgs.extend(paths.into_iter().map(|path| ModImage {
            path: path.into(),
            cached: None,
        }));
        self
    }

    /// Parse `boot.json` from the root of a mod archive
    pub fn from_archive(archive: &dyn ModArchive) -> Result<Self> {
        let text = archive
            .read_string(BOOT_JSON)?
            .with_context(|| format!("No '{}' found in {}", BOOT_JSON, archive.label()))?;
        Self::from_boot_json(&text)
            .with_context(|| format!("Failed to parse {} in {}", BOOT_JSON, archive.label()))
    }

    pub fn from_boot_json(text: &str) -> Result<Self> {
        let boot: BootJson = serde_json::from_str(text)?;
        Ok(Self {
            name: boot.name,
            version: boot.version,
            addon_plugins: boot.addon_plugin,
            imgs: boot
                .img_file_list
                .into_iter()
                .map(|path| ModImage { path, cached: None })
                .collect(),
        })
    }

    /// Config block addressed to `addon_name` (both `modName` and `addonName` must match)
    pub fn addon_params(&self, addon_name: &str) -> Option<&Value> {
        self.addon_plugins
            .iter()
            .find(|decl| decl.mod_name == addon_name && decl.addon_name == addon_name)
            .map(|decl| &decl.params)
    }
}
