//! Beauty Selector - image type selection for mod loaders
//!
//! Several mods may ship replacement images for the same game paths. Each
//! mod registers its images under named types; the player picks which types
//! are enabled and in what order, and every lookup is answered by the first
//! enabled type holding the requested path.

pub mod addon;
pub mod archive;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod getter;
pub mod hash;
pub mod manifest;
pub mod order;
pub mod params;
pub mod paths;
pub mod registration;
pub mod registry;
pub mod resolver;
pub mod traverse;

pub use addon::BeautySelector;
pub use config::{AddonConfig, StorageLocation, ADDON_NAME};
pub use diagnostics::{Diagnostics, HostLog, LogLevel, RecordingLog, TracingOnly};
pub use manifest::ModInfo;
pub use registration::RegistrationReport;
pub use resolver::LoadedImage;
