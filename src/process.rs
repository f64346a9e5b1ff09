//! Processing Pass
//!
//! Walks the source folder in deterministic order and, for each image not yet
//! in the ledger, generates a description, extracts tags, filters them against
//! the vocabulary, and commits the completed record with a ledger checkpoint.
//!
//! External-service failures are per-image: the image is logged and skipped,
//! the pass continues, and the image is retried on the next run. Only ledger
//! persistence failures abort the pass, since continuing would silently drop
//! paid-for model output.

use std::path::Path;

use crate::error::Result;
use crate::ledger::{Ledger, LedgerStore, MetadataRecord};
use crate::scanner::{image_identifier, ImageScanner};
use crate::services::vision::{DescriptionGenerator, TagExtractor};
use crate::vocabulary::CategoryVocabulary;

/// Run-level summary of a Processing Pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Images enumerated in the source folder
    pub attempted: usize,
    /// Records generated and committed this run
    pub succeeded: usize,
    /// Images skipped because the ledger already has them
    pub skipped: usize,
    /// Per-image external-service failures (retried next run)
    pub failed: usize,
}

impl ProcessStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} attempted, {} succeeded, {} skipped as already done, {} failed",
            self.attempted, self.succeeded, self.skipped, self.failed
        )
    }
}

/// Process every image in `image_folder`, checkpointing the ledger as it goes.
///
/// `checkpoint_every` controls persistence frequency: 1 saves after every
/// committed record (the crash-safest default), larger values batch writes.
/// A final save always runs if any record was committed since the last
/// checkpoint, so an interrupted batch never loses its tail silently and a
/// completed one never loses it at all.
pub async fn run_processing_pass(
    image_folder: &Path,
    ledger: &mut Ledger,
    store: &LedgerStore,
    vocabulary: &CategoryVocabulary,
    generator: &dyn DescriptionGenerator,
    extractor: &dyn TagExtractor,
    checkpoint_every: usize,
) -> Result<ProcessStats> {
    let images = ImageScanner::new()
        .scan(image_folder)
        .map_err(|e| crate::error::Error::Config(e.to_string()))?;

    let mut stats = ProcessStats {
        attempted: images.len(),
        ..Default::default()
    };

    tracing::info!(
        queue = images.len(),
        already_processed = ledger.len(),
        "Processing pass starting"
    );

    let checkpoint_every = checkpoint_every.max(1);
    let mut unsaved = 0usize;

    for image_path in &images {
        let identifier = image_identifier(image_path);

        if ledger.contains(&identifier) {
            tracing::debug!(identifier = %identifier, "Already in ledger, skipping");
            stats.skipped += 1;
            continue;
        }

        tracing::info!(identifier = %identifier, image = %image_path.display(), "Processing image");

        let description = match generator.describe(image_path).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "Description generation failed");
                stats.failed += 1;
                continue;
            }
        };

        let candidates = match extractor.extract_tags(&description, vocabulary).await {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "Tag extraction failed");
                stats.failed += 1;
                continue;
            }
        };

        // Out-of-vocabulary candidates are dropped, not errors
        let tags = vocabulary.filter(&candidates);
        if tags.len() < candidates.len() {
            tracing::debug!(
                identifier = %identifier,
                kept = tags.len(),
                dropped = candidates.len() - tags.len(),
                "Dropped out-of-vocabulary tags"
            );
        }

        ledger.upsert(identifier.clone(), MetadataRecord::new(description, tags));
        stats.succeeded += 1;
        unsaved += 1;

        if unsaved >= checkpoint_every {
            store.save(ledger)?;
            unsaved = 0;
        }
    }

    if unsaved > 0 {
        store.save(ledger)?;
    }

    tracing::info!(summary = %stats.display_string(), "Processing pass complete");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CorruptPolicy;
    use crate::services::vision::VisionError;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::result::Result;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    /// Deterministic stand-in for the model server.
    ///
    /// Describes each image as "<stem> described" and always proposes the
    /// configured tag candidates. Images whose stem appears in `fail_on`
    /// error out, and every describe call is recorded for idempotence checks.
    struct StubVision {
        candidates: Vec<String>,
        fail_on: HashSet<String>,
        describe_calls: Mutex<Vec<String>>,
    }

    impl StubVision {
        fn new(candidates: &[&str]) -> Self {
            Self {
                candidates: candidates.iter().map(|s| s.to_string()).collect(),
                fail_on: HashSet::new(),
                describe_calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, identifier: &str) -> Self {
            self.fail_on.insert(identifier.to_string());
            self
        }

        fn describe_count(&self) -> usize {
            self.describe_calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl DescriptionGenerator for StubVision {
        async fn describe(&self, image_path: &Path) -> Result<String, VisionError> {
            let id = image_identifier(image_path);
            self.describe_calls.lock().unwrap().push(id.clone());
            if self.fail_on.contains(&id) {
                return Err(VisionError::NetworkError("connection refused".to_string()));
            }
            Ok(format!("{} described", id))
        }
    }

    #[async_trait::async_trait]
    impl TagExtractor for StubVision {
        async fn extract_tags(
            &self,
            _description: &str,
            _vocabulary: &CategoryVocabulary,
        ) -> Result<Vec<String>, VisionError> {
            Ok(self.candidates.clone())
        }
    }

    fn fixture_folder(names: &[&str]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        for name in names {
            std::fs::write(images.join(name), JPEG_HEADER).unwrap();
        }
        let ledger_path = dir.path().join("ledger.json");
        (dir, ledger_path)
    }

    #[tokio::test]
    async fn test_processing_commits_filtered_tags() {
        let (dir, ledger_path) = fixture_folder(&["a.jpg"]);
        let store = LedgerStore::new(&ledger_path);
        let mut ledger = Ledger::new();
        let vocab = CategoryVocabulary::from_tags(["shirt", "jacket"]);
        let stub = StubVision::new(&["jacket", "blue"]);

        let stats = run_processing_pass(
            &dir.path().join("images"),
            &mut ledger,
            &store,
            &vocab,
            &stub,
            &stub,
            1,
        )
        .await
        .unwrap();

        assert_eq!(stats.succeeded, 1);
        let record = ledger.get("a").unwrap();
        assert_eq!(record.description, "a described");
        // "blue" is out of vocabulary and must be dropped, not stored
        assert!(record.tags.contains("jacket"));
        assert!(!record.tags.contains("blue"));
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let (dir, ledger_path) = fixture_folder(&["a.jpg", "b.jpg"]);
        let store = LedgerStore::new(&ledger_path);
        let vocab = CategoryVocabulary::from_tags(["jacket"]);
        let folder = dir.path().join("images");

        let stub = StubVision::new(&["jacket"]);
        let mut ledger = Ledger::new();
        let first = run_processing_pass(&folder, &mut ledger, &store, &vocab, &stub, &stub, 1)
            .await
            .unwrap();
        assert_eq!(first.succeeded, 2);
        let after_first = store.load(CorruptPolicy::Abort).unwrap();

        // Fresh process: resume from disk, nothing should be reprocessed
        let stub2 = StubVision::new(&["jacket"]);
        let mut resumed = store.load(CorruptPolicy::Abort).unwrap();
        let second = run_processing_pass(&folder, &mut resumed, &store, &vocab, &stub2, &stub2, 1)
            .await
            .unwrap();

        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(stub2.describe_count(), 0);
        assert_eq!(store.load(CorruptPolicy::Abort).unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let (dir, ledger_path) = fixture_folder(&["a.jpg", "b.jpg", "c.jpg"]);
        let store = LedgerStore::new(&ledger_path);
        let mut ledger = Ledger::new();
        let vocab = CategoryVocabulary::from_tags(["jacket"]);
        let stub = StubVision::new(&["jacket"]).failing_on("b");

        let stats = run_processing_pass(
            &dir.path().join("images"),
            &mut ledger,
            &store,
            &vocab,
            &stub,
            &stub,
            1,
        )
        .await
        .unwrap();

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert!(ledger.contains("a"));
        assert!(!ledger.contains("b"));
        assert!(ledger.contains("c"));

        // The failed image is not in the persisted ledger either, so the
        // next run retries it
        let on_disk = store.load(CorruptPolicy::Abort).unwrap();
        assert!(!on_disk.contains("b"));
    }

    #[tokio::test]
    async fn test_batched_checkpoint_saves_tail() {
        let (dir, ledger_path) = fixture_folder(&["a.jpg", "b.jpg", "c.jpg"]);
        let store = LedgerStore::new(&ledger_path);
        let mut ledger = Ledger::new();
        let vocab = CategoryVocabulary::from_tags(["jacket"]);
        let stub = StubVision::new(&["jacket"]);

        // Checkpoint every 2: the third record lands via the final save
        run_processing_pass(
            &dir.path().join("images"),
            &mut ledger,
            &store,
            &vocab,
            &stub,
            &stub,
            2,
        )
        .await
        .unwrap();

        let on_disk = store.load(CorruptPolicy::Abort).unwrap();
        assert_eq!(on_disk.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_folder_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        let mut ledger = Ledger::new();
        let vocab = CategoryVocabulary::from_tags(["jacket"]);
        let stub = StubVision::new(&["jacket"]);

        let result = run_processing_pass(
            &dir.path().join("missing"),
            &mut ledger,
            &store,
            &vocab,
            &stub,
            &stub,
            1,
        )
        .await;

        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }

    #[test]
    fn test_stats_display() {
        let stats = ProcessStats {
            attempted: 10,
            succeeded: 6,
            skipped: 3,
            failed: 1,
        };
        assert_eq!(
            stats.display_string(),
            "10 attempted, 6 succeeded, 3 skipped as already done, 1 failed"
        );
    }
}
