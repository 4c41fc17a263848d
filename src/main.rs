//! Beauty Selector CLI
//!
//! Stand-in host: loads every mod zip in a folder the way a mod loader
//! would, then answers lookups or edits the enabled type order.

use anyhow::{Context, Result};
use beauty_selector::archive::{ModArchive, ZipModArchive};
use beauty_selector::{
    AddonConfig, BeautySelector, LogLevel, ModInfo, RecordingLog, RegistrationReport,
    StorageLocation,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "beauty-selector")]
#[command(version)]
#[command(about = "Pick which mod image types are used, and in what order")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the cache databases (defaults to the user cache dir)
    #[arg(long, global = true, env = "BEAUTY_SELECTOR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Host key prefix applied to database names and saved keys
    #[arg(long, global = true)]
    key_prefix: Option<String>,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every mod zip in a folder and show the resulting type order
    Load {
        /// Folder containing mod .zip files
        mods_dir: PathBuf,
    },

    /// Resolve one image path through the enabled types
    Resolve {
        /// Folder containing mod .zip files
        mods_dir: PathBuf,

        /// Image path as the game requests it
        image_path: String,

        /// Write the decoded image here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Set and save the enabled type order
    Order {
        /// Folder containing mod .zip files
        mods_dir: PathBuf,

        /// Types to enable, highest priority first
        #[arg(required = true)]
        types: Vec<String>,
    },
}

/// Mod zips under `dir`, sorted by path
fn find_mod_zips(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("zip"))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}

fn register_zip(selector: &mut BeautySelector, path: &Path) -> Result<RegistrationReport> {
    let archive = ZipModArchive::open(path)?;
    let mut info = ModInfo::from_archive(&archive)?;
    let archive: Arc<dyn ModArchive> = Arc::new(archive);
    let report = selector
        .register_mod(&mut info, archive)
        .with_context(|| format!("Mod rejected: {}", path.display()))?;
    println!(
        "  {} {}: {} types",
        info.name,
        info.version,
        report.installed.len()
    );
    Ok(report)
}

/// Register every mod in `mods_dir` and finish the load
fn load(config: AddonConfig, log: Arc<RecordingLog>, mods_dir: &Path) -> Result<BeautySelector> {
    let mut selector = BeautySelector::new(config, log)?;

    let zips = find_mod_zips(mods_dir);
    if zips.is_empty() {
        warn!("No mod zips found in {}", mods_dir.display());
    }

    for path in &zips {
        match register_zip(&mut selector, path) {
            Ok(report) => {
                for rejected in &report.rejected {
                    println!("  skipped: {}", rejected);
                }
            }
            Err(e) => println!("  {:#}", e),
        }
    }

    selector.on_load_end();
    Ok(selector)
}

fn print_order(selector: &BeautySelector) {
    let view = selector.type_order_view();
    println!("\n=== Enabled Types ===");
    for (i, item) in view.enabled.iter().enumerate() {
        println!("{:>4}  {}", i + 1, item.label);
    }
    if !view.disabled.is_empty() {
        println!("\n=== Disabled Types ===");
        for item in &view.disabled {
            println!("      {}", item.label);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(if cli.verbose {
                "beauty_selector=debug".parse()?
            } else {
                "beauty_selector=warn".parse()?
            }))
            .init();
    }

    let storage = match cli.cache_dir {
        Some(dir) => StorageLocation::Directory(dir),
        None => StorageLocation::default_dir()?,
    };
    let config = AddonConfig {
        storage,
        key_prefix: cli.key_prefix,
        ..Default::default()
    };
    let log = Arc::new(RecordingLog::new());

    match cli.command {
        Commands::Load { mods_dir } => {
            println!("Loading mods from {}", mods_dir.display());
            let selector = load(config, log.clone(), &mods_dir)?;

            let registry = selector.registry();
            println!(
                "\nRegistered {} types from {} mods",
                registry.full_order().len(),
                registry.registered_mods().len()
            );
            if !registry.converted_mods().is_empty() {
                println!("Converted mods: {}", registry.converted_mods().join(", "));
            }
            print_order(&selector);
            selector.shutdown();
        }

        Commands::Resolve {
            mods_dir,
            image_path,
            output,
        } => {
            let selector = load(config, log.clone(), &mods_dir)?;

            let mut found = None;
            let mut failure = None;
            let handled = selector.image_loader(
                &image_path,
                (),
                |_, _, image| found = Some(image),
                |_, _, e| failure = Some(e),
            );
            selector.shutdown();

            if let Some(e) = failure {
                return Err(e.context(format!("Failed to decode {}", image_path)));
            }
            let Some(image) = found.filter(|_| handled) else {
                anyhow::bail!("No enabled type provides {}", image_path);
            };

            match output {
                Some(output) => {
                    std::fs::write(&output, &image.bytes)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("Wrote {} bytes to {}", image.bytes.len(), output.display());
                }
                None => {
                    println!("Path:       {}", image_path);
                    println!("MIME:       {}", image.mime);
                    println!("Size:       {} bytes", image.bytes.len());
                    if let Some((w, h)) = image.dimensions {
                        println!("Dimensions: {}x{}", w, h);
                    }
                }
            }
        }

        Commands::Order { mods_dir, types } => {
            let mut selector = load(config, log.clone(), &mods_dir)?;
            selector.set_enabled_order(&types)?;
            print_order(&selector);
            selector.shutdown();
        }
    }

    let errors = log.count_matching(LogLevel::Error, "");
    let warnings = log.count_matching(LogLevel::Warn, "");
    if errors + warnings > 0 {
        eprintln!("\n{} errors, {} warnings logged", errors, warnings);
    }

    Ok(())
}
