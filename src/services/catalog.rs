//! Media catalog client
//!
//! The catalog is the remote record of already-uploaded images. Two calls
//! matter here: "does an entry with this identifier exist" (the idempotence
//! guard for repeated Sync Pass runs) and "create an entry with image plus
//! metadata". Credentials come from the environment, never from config files.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::ledger::MetadataRecord;
use crate::services::rate_limit::RateLimiter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the catalog API key
pub const API_KEY_ENV: &str = "CATALOG_API_KEY";
/// Environment variable holding the catalog API secret
pub const API_SECRET_ENV: &str = "CATALOG_API_SECRET";

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Credentials missing from the environment
    #[error("Missing catalog credentials: set CATALOG_API_KEY and CATALOG_API_SECRET")]
    MissingCredentials,

    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Catalog API returned an error response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Image file could not be read for upload
    #[error("Cannot read image {0}: {1}")]
    ImageRead(String, String),
}

/// Remote catalog of uploaded images.
///
/// Injected into the Sync Pass so tests can substitute an in-memory catalog.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Existence check by identifier
    async fn contains(&self, identifier: &str) -> Result<bool, CatalogError>;

    /// Create an entry: the image file plus its ledger metadata.
    ///
    /// Returns the URL of the created entry.
    async fn upload(
        &self,
        image_path: &Path,
        identifier: &str,
        record: &MetadataRecord,
    ) -> Result<String, CatalogError>;
}

/// HTTP catalog client with basic-auth credentials
pub struct CatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    folder: String,
    api_key: String,
    api_secret: String,
    rate_limiter: RateLimiter,
}

impl CatalogClient {
    /// Create a new client, reading credentials from the environment.
    ///
    /// `min_interval` paces consecutive upload calls (courtesy to the
    /// service, not a correctness requirement).
    pub fn new(
        base_url: impl Into<String>,
        folder: impl Into<String>,
        min_interval: Duration,
    ) -> Result<Self, CatalogError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| CatalogError::MissingCredentials)?;
        let api_secret =
            std::env::var(API_SECRET_ENV).map_err(|_| CatalogError::MissingCredentials)?;

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            folder: folder.into(),
            api_key,
            api_secret,
            rate_limiter: RateLimiter::new(min_interval),
        })
    }

    fn resource_url(&self, identifier: &str) -> String {
        format!("{}/resources/{}/{}", self.base_url, self.folder, identifier)
    }
}

#[async_trait::async_trait]
impl Catalog for CatalogClient {
    async fn contains(&self, identifier: &str) -> Result<bool, CatalogError> {
        let url = self.resource_url(identifier);

        tracing::debug!(identifier = %identifier, url = %url, "Querying catalog for existing entry");

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == 404 {
            return Ok(false);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(status.as_u16(), error_text));
        }

        Ok(true)
    }

    async fn upload(
        &self,
        image_path: &Path,
        identifier: &str,
        record: &MetadataRecord,
    ) -> Result<String, CatalogError> {
        self.rate_limiter.wait().await;

        let bytes = tokio::fs::read(image_path).await.map_err(|e| {
            CatalogError::ImageRead(image_path.display().to_string(), e.to_string())
        })?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| identifier.to_string());

        let tags = record.tags.iter().cloned().collect::<Vec<_>>().join(",");
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("public_id", identifier.to_string())
            .text("folder", self.folder.clone())
            .text("tags", tags)
            .text("caption", record.description.clone());

        let url = format!("{}/resources", self.base_url);

        tracing::debug!(identifier = %identifier, url = %url, "Uploading image to catalog");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(status.as_u16(), error_text));
        }

        tracing::info!(identifier = %identifier, "Upload complete");

        Ok(self.resource_url(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_url_formatting() {
        let client = CatalogClient {
            http_client: reqwest::Client::new(),
            base_url: "https://catalog.example.com/api".to_string(),
            folder: "tagged".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            rate_limiter: RateLimiter::new(Duration::from_secs(1)),
        };
        assert_eq!(
            client.resource_url("a"),
            "https://catalog.example.com/api/resources/tagged/a"
        );
    }
}
