//! Vision model client — sends swing images plus a prompt to Claude.
//!
//! Provides a `VisionBackend` trait so the server can be exercised against a
//! stub, and `ClaudeVisionClient`, which calls the Anthropic Messages API.
//! Transient failures (429, 5xx, transport) are retried with backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::VisionConfig;
use crate::models::SwingPosition;
use crate::prompt::position_label;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

// ============================================================================
// VisionBackend trait
// ============================================================================

/// One image sent to the model.
#[derive(Debug, Clone)]
pub struct VisionImage {
    pub position: SwingPosition,
    pub media_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

/// Everything needed for one analysis call. Images are sent in order.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub images: Vec<VisionImage>,
    pub prompt: String,
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct VisionPing {
    pub model: String,
    pub latency_ms: u64,
    pub reply: String,
}

/// Abstraction over vision-capable language models.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Analyze the images and return the model's free-text answer.
    async fn analyze(&self, request: &VisionRequest) -> Result<String, VisionError>;

    /// Minimal round trip to verify credentials and connectivity.
    async fn ping(&self) -> Result<VisionPing, VisionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}, {kind}): {message}")]
    Api {
        code: u16,
        kind: String,
        message: String,
    },

    #[error("Response contained no text content")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },
}

impl VisionError {
    /// Rate limits, server errors and transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            VisionError::Http(e) => !e.is_builder() && !e.is_decode(),
            VisionError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Anthropic API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: String },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Clone, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

// ============================================================================
// ClaudeVisionClient
// ============================================================================

/// Client for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeVisionClient {
    client: Client,
    api_key: String,
    config: VisionConfig,
}

impl ClaudeVisionClient {
    pub fn new(api_key: impl Into<String>, config: VisionConfig) -> Result<Self, VisionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(VisionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// Build a client from `ANTHROPIC_API_KEY`.
    pub fn from_env(config: VisionConfig) -> Result<Self, VisionError> {
        let api_key = std::env::var(crate::config::API_KEY_ENV).unwrap_or_default();
        Self::new(api_key, config)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_with_retry(
        &self,
        content: &[ContentBlock<'_>],
        max_tokens: u32,
    ) -> Result<String, VisionError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.send_once(content, max_tokens),
            |e: &VisionError| {
                let transient = e.is_transient();
                if transient {
                    tracing::warn!(error = %e, "Transient vision API failure, retrying");
                }
                transient
            },
        )
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) if e.is_transient() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(attempts, error = %e, "All vision API retry attempts failed");
                Err(VisionError::RetryExhausted {
                    attempts,
                    last_error: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn send_once(
        &self,
        content: &[ContentBlock<'_>],
        max_tokens: u32,
    ) -> Result<String, VisionError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            messages: vec![Message {
                role: "user",
                content: content.to_vec(),
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (kind, message) = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| (e.kind, e.message))
                .unwrap_or_else(|| ("http_error".to_string(), error_body));

            tracing::error!(code = status.as_u16(), kind = %kind, message = %message, "Anthropic API error");

            return Err(VisionError::Api {
                code: status.as_u16(),
                kind,
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;

        let text: Vec<String> = body
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();

        if text.is_empty() {
            return Err(VisionError::EmptyResponse);
        }

        Ok(text.join("\n"))
    }
}

/// Label + image per position, then the prompt.
fn build_content(request: &VisionRequest) -> Vec<ContentBlock<'_>> {
    let mut content = Vec::with_capacity(request.images.len() * 2 + 1);
    for image in &request.images {
        content.push(ContentBlock::Text {
            text: position_label(image.position),
        });
        content.push(ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: &image.media_type,
                data: &image.data,
            },
        });
    }
    content.push(ContentBlock::Text {
        text: request.prompt.clone(),
    });
    content
}

#[async_trait]
impl VisionBackend for ClaudeVisionClient {
    async fn analyze(&self, request: &VisionRequest) -> Result<String, VisionError> {
        let content = build_content(request);
        tracing::info!(
            images = request.images.len(),
            model = %self.config.model,
            "Calling vision API to analyze swing"
        );
        let text = self.send_with_retry(&content, self.config.max_tokens).await?;
        tracing::info!(chars = text.len(), "Received analysis from vision API");
        Ok(text)
    }

    async fn ping(&self) -> Result<VisionPing, VisionError> {
        let start = Instant::now();
        let content = [ContentBlock::Text {
            text: "hello".to_string(),
        }];
        let reply = self.send_with_retry(&content, 16).await?;
        Ok(VisionPing {
            model: self.config.model.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
            reply,
        })
    }

    fn name(&self) -> &str {
        "claude"
    }
}

// ============================================================================
// TESTS
// ============================================================================
