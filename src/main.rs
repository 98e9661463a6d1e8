//! # Closet Keeper CLI (`closet`)
//!
//! The `closet` binary is the primary interface for the wardrobe engine.
//! It provides commands for ingesting garment photos, listing and
//! deleting catalogue items, reconciling the stores, generating outfit
//! recommendations, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! closet --config ./closet.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `closet init` | Write a starter configuration file |
//! | `closet ingest <files>...` | Analyze and catalogue garment photos |
//! | `closet list` | List catalogue items, optionally by category |
//! | `closet delete <id>` | Remove one item from both stores |
//! | `closet sync` | Re-ingest stored images that lost their metadata |
//! | `closet recommend` | Generate an outfit for a mood/weather/occasion |
//! | `closet scan` | Dump every metadata key with its resolved value |
//! | `closet purge --yes` | Delete everything from both stores |
//! | `closet serve` | Start the JSON HTTP server |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use closet_keeper::config::{load_config, STARTER_CONFIG};
use closet_keeper::ingest::{ingest, UploadImage};
use closet_keeper::models::WARDROBE_PREFIX;
use closet_keeper::recommend::{recommend, OutfitRequest};
use closet_keeper::scan::{load_inventory, scan_all};
use closet_keeper::server::run_server;
use closet_keeper::sync::{delete_item, purge_all, reconcile};
use closet_keeper::AppContext;

/// Closet Keeper CLI — a digital-wardrobe engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; credentials are read from the environment variables named there.
#[derive(Parser)]
#[command(
    name = "closet",
    about = "Closet Keeper — catalogue garment photos and get outfit advice",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./closet.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file.
    ///
    /// Refuses to overwrite an existing file.
    Init,

    /// Analyze and catalogue one or more garment photos.
    ///
    /// Each file is stored, described by the vision oracle, normalized,
    /// and persisted. Failures are reported per file; the rest of the
    /// batch is unaffected.
    Ingest {
        /// Image files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List catalogue items.
    List {
        /// Only show items in this category (canonical spelling,
        /// e.g. `Tops`, `Outerwear`).
        #[arg(long)]
        category: Option<String>,
    },

    /// Remove one item from both stores.
    Delete {
        /// The item id.
        id: String,
    },

    /// Re-ingest stored images that have no metadata record.
    Sync,

    /// Generate an outfit recommendation from the current catalogue.
    Recommend {
        /// Current mood (e.g. `relaxed`, `confident`).
        #[arg(long)]
        mood: String,
        /// Current weather (e.g. `rainy`, `hot`).
        #[arg(long)]
        weather: String,
        /// The occasion (e.g. `work`, `dinner party`).
        #[arg(long)]
        occasion: String,
    },

    /// Dump every metadata key with its resolved value as JSON.
    Scan,

    /// Delete every stored object and metadata key.
    Purge {
        /// Confirm the purge. Without this flag nothing is deleted.
        #[arg(long)]
        yes: bool,
    },

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // `init` runs before any config exists.
    if matches!(cli.command, Commands::Init) {
        if cli.config.exists() {
            anyhow::bail!("{} already exists", cli.config.display());
        }
        std::fs::write(&cli.config, STARTER_CONFIG)
            .with_context(|| format!("failed to write {}", cli.config.display()))?;
        println!("Wrote starter config to {}", cli.config.display());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let ctx = AppContext::from_config(config)?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { files } => {
            let mut images = Vec::with_capacity(files.len());
            for path in &files {
                images.push(read_image(path)?);
            }
            let outcome = ingest(&ctx, images).await?;
            for item in &outcome.items {
                println!("  {} — {} ({})", item.id, item.name, item.category);
            }
            for error in &outcome.errors {
                println!("  FAILED {} — {}", error.filename, error.message);
            }
            println!(
                "Ingested {} of {} images.",
                outcome.success_count(),
                outcome.items.len() + outcome.errors.len()
            );
        }
        Commands::List { category } => {
            let mut items = load_inventory(&ctx.metadata, &ctx.config.scan).await?;
            if let Some(category) = category {
                items.retain(|item| item.category.as_str() == category);
            }
            if items.is_empty() {
                println!("No items found.");
            }
            for item in &items {
                println!("{}  {:12}  {}", item.id, item.category.to_string(), item.name);
            }
        }
        Commands::Delete { id } => {
            delete_item(&ctx, &id).await?;
            println!("Deleted {}.", id);
        }
        Commands::Sync => {
            let report = reconcile(&ctx).await?;
            for error in &report.failed {
                println!("  FAILED {} — {}", error.filename, error.message);
            }
            println!(
                "Reconciled {} objects ({} failed).",
                report.processed,
                report.failed.len()
            );
        }
        Commands::Recommend {
            mood,
            weather,
            occasion,
        } => {
            let request = OutfitRequest {
                mood,
                weather,
                occasion,
            };
            let result = recommend(&ctx, &request).await?;
            println!("{}\n", result.recommendation);
            if !result.outfit.is_empty() {
                println!("Matched items:");
                for item in &result.outfit {
                    println!("  {} — {} ({})", item.id, item.name, item.category);
                }
            }
        }
        Commands::Scan => {
            let pattern = format!("{}*", WARDROBE_PREFIX);
            let outcome = scan_all(&ctx.metadata, &pattern, &ctx.config.scan).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Purge { yes } => {
            if !yes {
                anyhow::bail!("refusing to purge without --yes");
            }
            let report = purge_all(&ctx).await?;
            println!(
                "Purged {} objects and {} metadata records.",
                report.objects_deleted, report.records_deleted
            );
        }
        Commands::Serve => {
            run_server(ctx).await?;
        }
    }

    Ok(())
}

/// Load one image file and infer its content type from the extension.
fn read_image(path: &Path) -> Result<UploadImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.jpg")
        .to_string();
    let content_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Ok(UploadImage {
        filename,
        content_type: content_type.to_string(),
        bytes,
    })
}
