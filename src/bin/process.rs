//! autotag-process - Processing Pass entry point
//!
//! Generates a description and vocabulary-constrained tags for every image in
//! the source folder that the ledger does not already cover, checkpointing
//! the ledger as it goes.
//!
//! Exit code is non-zero only for fatal startup or persistence failures;
//! per-image external-service failures are summarized and exit zero.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autotag::config::{defaults, resolve, FileConfig};
use autotag::ledger::{CorruptPolicy, LedgerStore};
use autotag::process::run_processing_pass;
use autotag::services::VisionClient;
use autotag::vocabulary::CategoryVocabulary;

/// Command-line arguments for autotag-process
#[derive(Parser, Debug)]
#[command(name = "autotag-process")]
#[command(about = "Generate descriptions and tags for a folder of images")]
#[command(version)]
struct Args {
    /// Folder containing images to process
    #[arg(short, long, env = "AUTOTAG_IMAGE_FOLDER")]
    images: Option<PathBuf>,

    /// Ledger file (JSON) holding processed metadata
    #[arg(short, long, env = "AUTOTAG_LEDGER")]
    ledger: Option<PathBuf>,

    /// Category vocabulary file (JSON) with the valid tags
    #[arg(long, env = "AUTOTAG_CATEGORIES")]
    categories: Option<PathBuf>,

    /// Optional TOML config file overlay
    #[arg(short, long, env = "AUTOTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Model used to describe images
    #[arg(long, env = "AUTOTAG_VISION_MODEL")]
    vision_model: Option<String>,

    /// Model used to extract tags from descriptions
    #[arg(long, env = "AUTOTAG_TAGGING_MODEL")]
    tagging_model: Option<String>,

    /// Base URL of the Ollama-compatible model server
    #[arg(long, env = "AUTOTAG_OLLAMA_URL")]
    ollama_url: Option<String>,

    /// Seconds to wait between model calls
    #[arg(long, env = "AUTOTAG_RATE_LIMIT")]
    rate_limit: Option<u64>,

    /// Checkpoint the ledger every N committed records
    #[arg(long, env = "AUTOTAG_CHECKPOINT_EVERY")]
    checkpoint_every: Option<usize>,

    /// What to do when the ledger file exists but cannot be parsed
    #[arg(long, value_enum, default_value = "abort")]
    on_corrupt: CorruptPolicy,

    /// Discard the existing ledger and reprocess everything.
    /// Destructive; must be paired with --confirm-reset.
    #[arg(long, requires = "confirm_reset")]
    reset: bool,

    /// Required confirmation for --reset
    #[arg(long)]
    confirm_reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotag=info,autotag_process=info".into()),
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
    let categories_path = resolve(
        args.categories,
        file.categories_path,
        PathBuf::from(defaults::CATEGORIES_PATH),
    );
    let vision_model = resolve(
        args.vision_model,
        file.vision_model,
        defaults::VISION_MODEL.to_string(),
    );
    let tagging_model = resolve(
        args.tagging_model,
        file.tagging_model,
        defaults::TAGGING_MODEL.to_string(),
    );
    let ollama_url = resolve(
        args.ollama_url,
        file.ollama_url,
        defaults::OLLAMA_URL.to_string(),
    );
    let rate_limit = resolve(args.rate_limit, file.rate_limit_secs, defaults::RATE_LIMIT_SECS);
    let checkpoint_every = resolve(
        args.checkpoint_every,
        file.checkpoint_every,
        defaults::CHECKPOINT_EVERY,
    );

    info!("Starting autotag-process");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Image folder: {}", image_folder.display());
    info!("Ledger: {}", ledger_path.display());
    info!(
        "Models: {} (vision), {} (tagging) via {}",
        vision_model, tagging_model, ollama_url
    );

    let vocabulary =
        CategoryVocabulary::load(&categories_path).context("Failed to load category vocabulary")?;
    info!(
        "Vocabulary: {} valid tags from {}",
        vocabulary.len(),
        categories_path.display()
    );

    let store = LedgerStore::new(&ledger_path);
    let mut ledger = if args.reset {
        store.reset().context("Failed to reset ledger")?
    } else {
        store
            .load(args.on_corrupt)
            .context("Failed to load ledger")?
    };

    let client = VisionClient::new(
        ollama_url,
        vision_model,
        tagging_model,
        Duration::from_secs(rate_limit),
    )
    .context("Failed to create vision client")?;

    let stats = run_processing_pass(
        &image_folder,
        &mut ledger,
        &store,
        &vocabulary,
        &client,
        &client,
        checkpoint_every,
    )
    .await
    .context("Processing pass failed")?;

    info!("Summary: {}", stats.display_string());
    info!("Metadata persisted to {}", ledger_path.display());

    Ok(())
}
