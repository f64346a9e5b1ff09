//! Run-level configuration
//!
//! All configuration is static for the run: resolved once at process start,
//! then passed explicitly into the pass functions. Resolution priority for
//! each option:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (handled by clap's `env` fallbacks)
//! 3. TOML config file
//! 4. Compiled default

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Compiled defaults, lowest priority in the resolution order
pub mod defaults {
    pub const IMAGE_FOLDER: &str = "images/menswear";
    pub const LEDGER_PATH: &str = "data/image_metadata.json";
    pub const CATEGORIES_PATH: &str = "data/categories.json";
    pub const VISION_MODEL: &str = "llama3.2-vision";
    pub const TAGGING_MODEL: &str = "llama3.2:3b";
    pub const OLLAMA_URL: &str = "http://localhost:11434";
    pub const CATALOG_FOLDER: &str = "tagged";
    /// Seconds between model calls in the Processing Pass
    pub const RATE_LIMIT_SECS: u64 = 3;
    /// Seconds between uploads in the Sync Pass
    pub const UPLOAD_DELAY_SECS: u64 = 1;
    /// Ledger checkpoint frequency (1 = after every record)
    pub const CHECKPOINT_EVERY: usize = 1;
}

/// Optional TOML overlay, below CLI and env in priority.
///
/// Every field is optional; absent fields fall through to the compiled
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub image_folder: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub categories_path: Option<PathBuf>,
    pub vision_model: Option<String>,
    pub tagging_model: Option<String>,
    pub ollama_url: Option<String>,
    pub catalog_url: Option<String>,
    pub catalog_folder: Option<String>,
    pub rate_limit_secs: Option<u64>,
    pub upload_delay_secs: Option<u64>,
    pub checkpoint_every: Option<usize>,
}

impl FileConfig {
    /// Load the overlay.
    ///
    /// An explicitly passed path must exist and parse; that is operator
    /// intent. The default location (`~/.config/autotag/config.toml`) is
    /// probed permissively: missing means no overlay.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: FileConfig = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!(
                "Cannot parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Loaded config file overlay");
        Ok(config)
    }

    /// Default configuration file path for the platform
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("autotag").join("config.toml"))
    }
}

/// Resolve one option: CLI/env value, else file overlay, else default.
pub fn resolve<T>(cli: Option<T>, file: Option<T>, default: T) -> T {
    cli.or(file).unwrap_or(default)
}
