//! Persistent, resumable processing ledger
//!
//! The ledger is the only record of expensive, non-deterministic model output,
//! so every overwrite keeps a backup of the previous good state and the new
//! document is written to a temp file and renamed into place. A crash between
//! checkpoints never loses completed records.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Generated metadata for one image.
///
/// A record is only ever written complete: description and tags are committed
/// together at the end of a successful processing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Free-text description produced by the vision model
    pub description: String,
    /// Tags, each a member of the loaded category vocabulary
    pub tags: BTreeSet<String>,
    /// When processing completed for this image
    pub processed_at: DateTime<Utc>,
}

impl MetadataRecord {
    pub fn new(description: String, tags: BTreeSet<String>) -> Self {
        Self {
            description,
            tags,
            processed_at: Utc::now(),
        }
    }
}

/// Mapping from image identifier to its metadata record.
///
/// Serialized transparently as `identifier -> record`, which is the stable
/// on-disk layout the Sync Pass and future versions depend on. `BTreeMap`
/// keeps the serialized document in a deterministic key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    records: BTreeMap<String, MetadataRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership check used to skip already-processed images
    pub fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&MetadataRecord> {
        self.records.get(identifier)
    }

    /// Insert or replace a record in memory.
    ///
    /// Does not persist; persistence is an explicit [`LedgerStore::save`] so
    /// the caller controls checkpoint frequency.
    pub fn upsert(&mut self, identifier: String, record: MetadataRecord) {
        self.records.insert(identifier, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataRecord)> {
        self.records.iter()
    }
}

/// Policy for a ledger file that exists but fails to parse.
///
/// The choice belongs to the operator, not this module: a corrupt ledger is
/// never deleted or silently replaced without explicit intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CorruptPolicy {
    /// Abort the run and surface the parse error
    #[default]
    Abort,
    /// Proceed with an empty ledger, leaving the corrupt file untouched
    /// until the next save rotates it into the backup
    StartEmpty,
}

/// JSON-backed ledger persistence with backup-before-overwrite
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rotating backup kept beside the ledger
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the persisted ledger, or an empty one if no file exists yet.
    pub fn load(&self, policy: CorruptPolicy) -> Result<Ledger> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No existing ledger, starting empty");
            return Ok(Ledger::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Ledger>(&contents) {
            Ok(ledger) => {
                tracing::info!(
                    path = %self.path.display(),
                    records = ledger.len(),
                    "Resuming from existing ledger"
                );
                Ok(ledger)
            }
            Err(source) => match policy {
                CorruptPolicy::Abort => Err(Error::CorruptLedger {
                    path: self.path.clone(),
                    source,
                }),
                CorruptPolicy::StartEmpty => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %source,
                        "Ledger is corrupt; proceeding with an empty ledger per policy"
                    );
                    Ok(Ledger::new())
                }
            },
        }
    }

    /// Discard any on-disk ledger and return an empty one.
    ///
    /// The existing file is rotated into the backup before removal, so even an
    /// explicit reset keeps one generation of recoverable state.
    pub fn reset(&self) -> Result<Ledger> {
        if self.path.exists() {
            std::fs::copy(&self.path, self.backup_path())?;
            std::fs::remove_file(&self.path)?;
            tracing::warn!(
                path = %self.path.display(),
                backup = %self.backup_path().display(),
                "Ledger reset: previous state moved to backup"
            );
        }
        Ok(Ledger::new())
    }

    /// Persist the full ledger, keeping the previous on-disk copy as a backup.
    ///
    /// Write order: copy current file to `<path>.bak`, serialize to
    /// `<path>.tmp`, then rename over the target. The existing copy is intact
    /// until the rename, so a crash mid-write never loses the last good state.
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| Error::WriteFailure {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        if self.path.exists() {
            if let Err(e) = std::fs::copy(&self.path, self.backup_path()) {
                tracing::warn!(
                    backup = %self.backup_path().display(),
                    error = %e,
                    "Backup creation failed"
                );
            }
        }

        let json = serde_json::to_string_pretty(ledger).map_err(|e| Error::WriteFailure {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let tmp = self.temp_path();
        std::fs::write(&tmp, json).map_err(|source| Error::WriteFailure {
            path: self.path.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            Error::WriteFailure {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(
            path = %self.path.display(),
            records = ledger.len(),
            "Ledger checkpoint written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(description: &str, tags: &[&str]) -> MetadataRecord {
        MetadataRecord::new(
            description.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        let ledger = store.load(CorruptPolicy::Abort).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = Ledger::new();
        ledger.upsert("a".to_string(), record("A blue jacket", &["jacket"]));
        store.save(&ledger).unwrap();

        let loaded = store.load(CorruptPolicy::Abort).unwrap();
        assert_eq!(loaded, ledger);
        assert!(loaded.contains("a"));
        assert_eq!(loaded.get("a").unwrap().description, "A blue jacket");
    }

    #[test]
    fn test_on_disk_layout_is_identifier_to_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let store = LedgerStore::new(&path);

        let mut ledger = Ledger::new();
        ledger.upsert("a".to_string(), record("desc", &["shirt"]));
        store.save(&ledger).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["a"]["description"], "desc");
        assert_eq!(raw["a"]["tags"][0], "shirt");
    }

    #[test]
    fn test_save_keeps_backup_of_previous_state() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = Ledger::new();
        ledger.upsert("a".to_string(), record("first", &[]));
        store.save(&ledger).unwrap();

        ledger.upsert("b".to_string(), record("second", &[]));
        store.save(&ledger).unwrap();

        let backup: Ledger =
            serde_json::from_str(&std::fs::read_to_string(store.backup_path()).unwrap()).unwrap();
        assert_eq!(backup.len(), 1);
        assert!(backup.contains("a"));
        assert!(!backup.contains("b"));

        let current = store.load(CorruptPolicy::Abort).unwrap();
        assert_eq!(current.len(), 2);
    }

    #[test]
    fn test_corrupt_ledger_abort_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = LedgerStore::new(&path);
        match store.load(CorruptPolicy::Abort) {
            Err(Error::CorruptLedger { .. }) => {}
            other => panic!("Expected CorruptLedger, got {:?}", other.map(|l| l.len())),
        }
        // The corrupt file must not have been deleted or replaced
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_corrupt_ledger_start_empty_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = LedgerStore::new(&path);
        let ledger = store.load(CorruptPolicy::StartEmpty).unwrap();
        assert!(ledger.is_empty());
        // Still untouched until the next save
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_reset_backs_up_and_removes() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let mut ledger = Ledger::new();
        ledger.upsert("a".to_string(), record("kept", &[]));
        store.save(&ledger).unwrap();

        let fresh = store.reset().unwrap();
        assert!(fresh.is_empty());
        assert!(!store.path().exists());

        let backup: Ledger =
            serde_json::from_str(&std::fs::read_to_string(store.backup_path()).unwrap()).unwrap();
        assert!(backup.contains("a"));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut ledger = Ledger::new();
        ledger.upsert("a".to_string(), record("old", &[]));
        ledger.upsert("a".to_string(), record("new", &["jacket"]));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("a").unwrap().description, "new");
    }

    #[test]
    fn test_no_temp_file_left_after_save() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        store.save(&Ledger::new()).unwrap();
        assert!(!store.temp_path().exists());
    }
}
