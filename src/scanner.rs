//! Image file scanner
//!
//! Enumerates the source folder in a deterministic (lexicographic) order so
//! repeated runs visit images identically, verifying candidates by extension
//! and magic bytes. Also derives the stable identifier used as the ledger key
//! and the catalog lookup key.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Image scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access file
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Derive the stable identifier for an image: its file stem.
///
/// "images/menswear/a.jpg" -> "a". Stable across runs as long as the file
/// keeps its name.
pub fn image_identifier(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Image file scanner
pub struct ImageScanner {
    ignore_patterns: Vec<String>,
    max_depth: Option<usize>,
}

impl ImageScanner {
    /// Create new scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            max_depth: None,
        }
    }

    /// Scan directory for image files, sorted lexicographically by path.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        let mut image_files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let path = entry.path();
                    match self.is_image_file(path) {
                        Ok(true) => image_files.push(path.to_path_buf()),
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!("Error verifying {}: {}", path.display(), e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    // Continue scanning, don't abort
                }
            }
        }

        // Re-runs must enumerate in the same order
        image_files.sort();

        tracing::debug!(
            "Scan complete: {} image files under {}",
            image_files.len(),
            root_path.display()
        );

        Ok(image_files)
    }

    /// Check if entry should be processed
    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern) {
                return false;
            }
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }

    /// Check if file is an image format
    fn is_image_file(&self, path: &Path) -> Result<bool, ScanError> {
        // 1. Check extension first (fast)
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.is_image_extension(&ext_lower) {
                // 2. Verify with magic bytes (reliable)
                return self.verify_magic_bytes(path);
            }
        }

        Ok(false)
    }

    /// Check if extension is a recognized image format
    fn is_image_extension(&self, ext: &str) -> bool {
        matches!(ext, "jpg" | "jpeg" | "png" | "gif" | "webp")
    }

    /// Verify file type using magic bytes
    fn verify_magic_bytes(&self, path: &Path) -> Result<bool, ScanError> {
        let mut file = File::open(path)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        let mut buffer = [0u8; 12];
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))?;

        if bytes_read < 4 {
            return Ok(false); // Too small to be an image
        }

        let is_image = match &buffer[..bytes_read.min(12)] {
            // JPEG
            [0xFF, 0xD8, 0xFF, ..] => true,

            // PNG
            [0x89, b'P', b'N', b'G', ..] => true,

            // GIF87a / GIF89a
            [b'G', b'I', b'F', b'8', ..] => true,

            // WebP (RIFF container)
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P'] => true,

            _ => false,
        };

        Ok(is_image)
    }
}

impl Default for ImageScanner {
    fn default() -> Self {
        Self::new()
    }
}
