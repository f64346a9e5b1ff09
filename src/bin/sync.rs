//! autotag-sync - Sync Pass entry point
//!
//! Uploads every image the catalog does not already have, attaching the
//! description and tags recorded by autotag-process. Safe to re-run: the
//! catalog existence check makes repeated runs upload each image at most once.
//!
//! Credentials come from the CATALOG_API_KEY / CATALOG_API_SECRET environment
//! variables. Exit code is non-zero only for fatal startup failures.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autotag::config::{defaults, resolve, FileConfig};
use autotag::ledger::{CorruptPolicy, LedgerStore};
use autotag::services::CatalogClient;
use autotag::sync::run_sync_pass;

/// Command-line arguments for autotag-sync
#[derive(Parser, Debug)]
#[command(name = "autotag-sync")]
#[command(about = "Upload images and their ledger metadata to the catalog")]
#[command(version)]
struct Args {
    /// Folder containing images to upload
    #[arg(short, long, env = "AUTOTAG_IMAGE_FOLDER")]
    images: Option<PathBuf>,

    /// Ledger file (JSON) produced by autotag-process
    #[arg(short, long, env = "AUTOTAG_LEDGER")]
    ledger: Option<PathBuf>,

    /// Optional TOML config file overlay
    #[arg(short, long, env = "AUTOTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the catalog API
    #[arg(long, env = "AUTOTAG_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Catalog folder uploads are filed under
    #[arg(long, env = "AUTOTAG_CATALOG_FOLDER")]
    catalog_folder: Option<String>,

    /// Seconds to wait between uploads
    #[arg(long, env = "AUTOTAG_UPLOAD_DELAY")]
    upload_delay: Option<u64>,

    /// What to do when the ledger file exists but cannot be parsed
    #[arg(long, value_enum, default_value = "abort")]
    on_corrupt: CorruptPolicy,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotag=info,autotag_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let file = FileConfig::load(args.config.as_deref()).context("Failed to load config file")?;

    let image_folder = resolve(
        args.images,
        file.image_folder,
        PathBuf::from(defaults::IMAGE_FOLDER),
    );
    let ledger_path = resolve(
        args.ledger,
        file.ledger_path,
        PathBuf::from(defaults::LEDGER_PATH),
    );
    let catalog_url = args
        .catalog_url
        .or(file.catalog_url)
        .context("Catalog URL is required (--catalog-url or AUTOTAG_CATALOG_URL)")?;
    let catalog_folder = resolve(
        args.catalog_folder,
        file.catalog_folder,
        defaults::CATALOG_FOLDER.to_string(),
    );
    let upload_delay = resolve(
        args.upload_delay,
        file.upload_delay_secs,
        defaults::UPLOAD_DELAY_SECS,
    );

    info!("Starting autotag-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Image folder: {}", image_folder.display());
    info!("Ledger: {}", ledger_path.display());
    info!("Catalog: {} (folder {})", catalog_url, catalog_folder);

    let store = LedgerStore::new(&ledger_path);
    let ledger = store
        .load(args.on_corrupt)
        .context("Failed to load ledger")?;
    if ledger.is_empty() {
        tracing::warn!("Ledger is empty; uploads will be skipped until autotag-process runs");
    }

    let catalog = CatalogClient::new(
        catalog_url,
        catalog_folder,
        Duration::from_secs(upload_delay),
    )
    .context("Failed to create catalog client")?;

    let stats = run_sync_pass(&image_folder, &ledger, &catalog)
        .await
        .context("Sync pass failed")?;

    info!("Summary: {}", stats.display_string());

    Ok(())
}
