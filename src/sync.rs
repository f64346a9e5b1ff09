//! Sync Pass
//!
//! Walks the source folder and uploads every image the catalog does not
//! already have, attaching the description and tags from the ledger. The
//! catalog existence check is the idempotence guard: repeated runs upload
//! each image at most once.
//!
//! An image with no ledger record yet is skipped with a warning, not an
//! error: the Processing Pass simply has not reached it. Upload failures are
//! logged and the image stays not-uploaded for the next run; there are no
//! retries within a run.

use std::path::Path;

use crate::error::Result;
use crate::ledger::Ledger;
use crate::scanner::{image_identifier, ImageScanner};
use crate::services::catalog::Catalog;

/// Run-level summary of a Sync Pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Images enumerated in the source folder
    pub examined: usize,
    /// Images uploaded this run
    pub uploaded: usize,
    /// Images the catalog already had
    pub already_present: usize,
    /// Images skipped because the ledger has no record yet
    pub missing_metadata: usize,
    /// Existence checks or uploads that failed (retried next run)
    pub failed: usize,
}

impl SyncStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} examined, {} uploaded, {} already in catalog, {} awaiting metadata, {} failed",
            self.examined, self.uploaded, self.already_present, self.missing_metadata, self.failed
        )
    }
}

/// Upload every not-yet-cataloged image with its ledger metadata.
pub async fn run_sync_pass(
    image_folder: &Path,
    ledger: &Ledger,
    catalog: &dyn Catalog,
) -> Result<SyncStats> {
    let images = ImageScanner::new()
        .scan(image_folder)
        .map_err(|e| crate::error::Error::Config(e.to_string()))?;

    let mut stats = SyncStats {
        examined: images.len(),
        ..Default::default()
    };

    tracing::info!(
        queue = images.len(),
        ledger_records = ledger.len(),
        "Sync pass starting"
    );

    for image_path in &images {
        let identifier = image_identifier(image_path);

        match catalog.contains(&identifier).await {
            Ok(true) => {
                tracing::debug!(identifier = %identifier, "Already in catalog, skipping");
                stats.already_present += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "Catalog existence check failed");
                stats.failed += 1;
                continue;
            }
        }

        let Some(record) = ledger.get(&identifier) else {
            // Cross-pass ordering: the Processing Pass has not produced a
            // record for this image yet
            tracing::warn!(
                identifier = %identifier,
                "No ledger record yet, skipping upload"
            );
            stats.missing_metadata += 1;
            continue;
        };

        match catalog.upload(image_path, &identifier, record).await {
            Ok(url) => {
                tracing::info!(identifier = %identifier, url = %url, "Uploaded");
                stats.uploaded += 1;
            }
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "Upload failed");
                stats.failed += 1;
            }
        }
    }

    tracing::info!(summary = %stats.display_string(), "Sync pass complete");

    Ok(stats)
}
