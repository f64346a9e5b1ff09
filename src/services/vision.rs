//! Vision model client (Ollama-compatible chat API)
//!
//! Two-step pipeline against a local model server:
//! 1. a vision model produces a free-text description of the image;
//! 2. a tagging model extracts candidate tags from that description as a
//!    comma-separated list, constrained by prompt to the category vocabulary.
//!
//! Filtering the extractor's output against the vocabulary is the caller's
//! job: the model is not trusted to honor the prompt.
//!
//! The client enforces a minimum interval between model calls and bounds each
//! request with a timeout; expiry surfaces as a network error the pass treats
//! as a per-image failure.

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::rate_limit::RateLimiter;
use crate::vocabulary::CategoryVocabulary;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const DESCRIPTION_PROMPT: &str = "You are an image analysis model assisting in creating detailed \
descriptions for an e-commerce platform. Analyze the attached product shoot image and provide a \
professional description. Identify the main products, describe their design, material, fit, color, \
and texture, and note how the setting complements them. Suggest potential product callouts for \
marketing. Limit the response to 200 words and format it like an editorial feature.";

const TAG_RULES: &str = "Rules:\n\
- Do not invent new tags.\n\
- Only choose tags directly relevant to the explanation.\n\
- Return the tags as a comma-separated list.\n\n";

/// Vision service client errors
#[derive(Debug, Error)]
pub enum VisionError {
    /// Network communication error (includes request timeout)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Model server returned an error response
    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    /// Failed to parse model server response JSON
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Model returned no usable text
    #[error("Model returned an empty response for {0}")]
    EmptyResponse(String),

    /// Image file could not be read
    #[error("Cannot read image {0}: {1}")]
    ImageRead(String, String),
}

/// Chat request body for the Ollama `/api/chat` endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// One chat message; `images` carries base64-encoded image payloads
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

/// Chat response body (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

/// Produces a free-text description for an image.
///
/// Injected into the Processing Pass so tests can substitute a deterministic
/// stub for the model server.
#[async_trait::async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn describe(&self, image_path: &Path) -> Result<String, VisionError>;
}

/// Extracts candidate tags from a description.
///
/// Returns raw candidates; the caller filters them against the vocabulary.
#[async_trait::async_trait]
pub trait TagExtractor: Send + Sync {
    async fn extract_tags(
        &self,
        description: &str,
        vocabulary: &CategoryVocabulary,
    ) -> Result<Vec<String>, VisionError>;
}

/// Ollama-compatible vision/tagging client
pub struct VisionClient {
    http_client: reqwest::Client,
    base_url: String,
    vision_model: String,
    tagging_model: String,
    rate_limiter: RateLimiter,
}

impl VisionClient {
    /// Create a new client against an Ollama-compatible server.
    ///
    /// `min_interval` paces consecutive model calls.
    pub fn new(
        base_url: impl Into<String>,
        vision_model: impl Into<String>,
        tagging_model: impl Into<String>,
        min_interval: Duration,
    ) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vision_model: vision_model.into(),
            tagging_model: tagging_model.into(),
            rate_limiter: RateLimiter::new(min_interval),
        })
    }

    async fn chat(&self, model: &str, message: ChatMessage) -> Result<String, VisionError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            model,
            messages: vec![message],
            stream: false,
        };

        tracing::debug!(model = %model, url = %url, "Querying vision service");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VisionError::ApiError(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ParseError(e.to_string()))?;

        Ok(chat
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl DescriptionGenerator for VisionClient {
    /// Send the image to the vision model and return its description.
    async fn describe(&self, image_path: &Path) -> Result<String, VisionError> {
        let bytes = tokio::fs::read(image_path).await.map_err(|e| {
            VisionError::ImageRead(image_path.display().to_string(), e.to_string())
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let description = self
            .chat(
                &self.vision_model,
                ChatMessage {
                    role: "user".to_string(),
                    content: DESCRIPTION_PROMPT.to_string(),
                    images: Some(vec![encoded]),
                },
            )
            .await?;

        if description.is_empty() {
            return Err(VisionError::EmptyResponse(
                image_path.display().to_string(),
            ));
        }

        tracing::info!(
            image = %image_path.display(),
            chars = description.len(),
            "Description generated"
        );

        Ok(description)
    }
}

#[async_trait::async_trait]
impl TagExtractor for VisionClient {
    /// Ask the tagging model for tags relevant to the description.
    async fn extract_tags(
        &self,
        description: &str,
        vocabulary: &CategoryVocabulary,
    ) -> Result<Vec<String>, VisionError> {
        let prompt = format!(
            "From the following explanation, select relevant tags ONLY from this list:\n{}\n\n{}Explanation:\n{}",
            vocabulary.prompt_list(),
            TAG_RULES,
            description
        );

        let reply = self
            .chat(
                &self.tagging_model,
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                    images: None,
                },
            )
            .await?;

        Ok(parse_tag_list(&reply))
    }
}

/// Split a comma-separated model reply into trimmed, non-empty candidates.
fn parse_tag_list(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = VisionClient::new(
            "http://localhost:11434/",
            "llama3.2-vision",
            "llama3.2:3b",
            Duration::from_secs(3),
        );
        assert!(client.is_ok());
        // Trailing slash must not double up in request URLs
        assert_eq!(client.unwrap().base_url, "http://localhost:11434");
    }

    #[test]
    fn test_chat_response_parsing() {
        let json_str = r#"{
            "model": "llama3.2:3b",
            "created_at": "2025-01-10T12:00:00Z",
            "message": {
                "role": "assistant",
                "content": "jacket, trousers"
            },
            "done": true
        }"#;

        let response: ChatResponse = serde_json::from_str(json_str).unwrap();
        assert_eq!(response.message.unwrap().content, "jacket, trousers");
    }

    #[test]
    fn test_chat_request_omits_empty_images() {
        let request = ChatRequest {
            model: "llama3.2:3b",
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
                images: None,
            }],
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("images"));
        assert!(json.contains(r#""stream":false"#));
    }

    #[test]
    fn test_parse_tag_list() {
        assert_eq!(
            parse_tag_list("jacket, blue , trousers"),
            vec!["jacket", "blue", "trousers"]
        );
        assert_eq!(parse_tag_list(""), Vec::<String>::new());
        assert_eq!(parse_tag_list(" , ,jacket"), vec!["jacket"]);
    }
}
