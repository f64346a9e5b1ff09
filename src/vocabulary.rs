//! Category vocabulary loading and tag validation
//!
//! The vocabulary is the fixed set of permitted tag strings. It is loaded once
//! at startup and immutable for the run; every record committed to the ledger
//! satisfies `tags ⊆ vocabulary`.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Vocabulary file shapes accepted by the loader.
///
/// Either a bare JSON array of strings or an object with a `valid_tags` array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VocabularyFile {
    Wrapped { valid_tags: Vec<String> },
    Bare(Vec<String>),
}

/// Fixed set of valid tag strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryVocabulary {
    tags: BTreeSet<String>,
}

impl CategoryVocabulary {
    /// Load the vocabulary from a JSON file.
    ///
    /// A missing or unreadable file is a configuration error: the pass cannot
    /// validate tags without it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read vocabulary file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: VocabularyFile = serde_json::from_str(&contents).map_err(|e| {
            Error::Config(format!(
                "Cannot parse vocabulary file {}: {}",
                path.display(),
                e
            ))
        })?;

        let tags = match file {
            VocabularyFile::Wrapped { valid_tags } => valid_tags,
            VocabularyFile::Bare(tags) => tags,
        };

        Ok(Self {
            tags: tags.into_iter().collect(),
        })
    }

    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Keep only tags that belong to the vocabulary.
    ///
    /// Out-of-vocabulary strings from the extractor are dropped, not errors.
    pub fn filter<I, S>(&self, candidates: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        candidates
            .into_iter()
            .filter_map(|t| {
                let t = t.as_ref().trim();
                self.contains(t).then(|| t.to_string())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Comma-separated listing for the tagging prompt
    pub fn prompt_list(&self) -> String {
        self.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_wrapped_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(&path, r#"{"valid_tags": ["shirt", "jacket"]}"#).unwrap();

        let vocab = CategoryVocabulary::load(&path).unwrap();
        assert_eq!(vocab.len(), 2);
        assert!(vocab.contains("shirt"));
        assert!(vocab.contains("jacket"));
    }

    #[test]
    fn test_load_bare_array_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("categories.json");
        std::fs::write(&path, r#"["shirt", "jacket"]"#).unwrap();

        let vocab = CategoryVocabulary::load(&path).unwrap();
        assert!(vocab.contains("jacket"));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = CategoryVocabulary::load(Path::new("/nonexistent/categories.json"));
        match result {
            Err(Error::Config(_)) => {}
            other => panic!("Expected Config error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_filter_drops_out_of_vocabulary_tags() {
        let vocab = CategoryVocabulary::from_tags(["shirt", "jacket"]);
        let filtered = vocab.filter(["jacket", "blue"]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("jacket"));
        assert!(!filtered.contains("blue"));
    }

    #[test]
    fn test_filter_trims_whitespace() {
        let vocab = CategoryVocabulary::from_tags(["jacket"]);
        let filtered = vocab.filter([" jacket ", "  "]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("jacket"));
    }

    #[test]
    fn test_prompt_list_is_deterministic() {
        let vocab = CategoryVocabulary::from_tags(["shirt", "jacket"]);
        assert_eq!(vocab.prompt_list(), "jacket, shirt");
    }
}
