//! Language-model capability for Seren: Gemini text generation
//!
//! Provides a `LanguageModel` trait with a Gemini `generateContent`
//! implementation, used in three roles: session scoring and trait
//! extraction (structured JSON mode) and the companion reply (plain text).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

// ============================================================================
// LanguageModel trait
// ============================================================================

/// Abstraction over text-generation providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate free-form text for the given prompt.
    async fn generate_text(&self, prompt: &str) -> Result<String, LanguageError>;

    /// Generate a structured response: the provider is asked for a
    /// JSON-only reply and the returned text is parsed into a value.
    async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value, LanguageError>;

    /// Model name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

/// Text-generation errors
#[derive(Error, Debug)]
pub enum LanguageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no candidate text")]
    EmptyResponse,

    #[error("Response text was not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config types
// ============================================================================

/// Gemini generation client configuration for one model role.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl ModelConfig {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Create a Gemini-backed handle for one configured model role.
pub fn create_model(
    settings: &crate::config::LanguageConfig,
    model: &str,
) -> Result<Arc<dyn LanguageModel>, LanguageError> {
    let mut config = ModelConfig::new(None, model.to_string());
    config.max_retries = settings.max_retries;
    config.retry_delay_ms = settings.retry_delay_ms;
    Ok(Arc::new(GeminiClient::new(config)?))
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiClient
// ============================================================================

/// Gemini generation client for the `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: ModelConfig,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Result<Self, LanguageError> {
        if config.api_key.is_empty() {
            return Err(LanguageError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: ModelConfig, base_url: String) -> Result<Self, LanguageError> {
        if config.api_key.is_empty() {
            return Err(LanguageError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Generate plain text for the given prompt, with retries.
    pub async fn generate(&self, prompt: &str) -> Result<String, LanguageError> {
        let result = Retry::spawn(self.retry_strategy(), || {
            self.generate_once(prompt, OutputMode::Text)
        })
        .await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    model = %self.config.model,
                    attempts = self.config.max_retries,
                    error = %e,
                    "All generation retry attempts failed"
                );
                Err(LanguageError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    /// Generate a JSON-mode response and parse it, with retries.
    pub async fn generate_structured(
        &self,
        prompt: &str,
    ) -> Result<serde_json::Value, LanguageError> {
        let result = Retry::spawn(self.retry_strategy(), || async {
            let text = self.generate_once(prompt, OutputMode::Json).await?;
            serde_json::from_str::<serde_json::Value>(&text).map_err(LanguageError::from)
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(
                    model = %self.config.model,
                    attempts = self.config.max_retries,
                    error = %e,
                    "All structured-generation retry attempts failed"
                );
                Err(LanguageError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries)
    }

    async fn generate_once(
        &self,
        prompt: &str,
        mode: OutputMode,
    ) -> Result<String, LanguageError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: match mode {
                OutputMode::Json => Some(GenerationConfig {
                    response_mime_type: "application/json".to_string(),
                }),
                OutputMode::Text => None,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(LanguageError::Api { code, message });
        }

        let body: GenerateResponse = response.json().await?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LanguageError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, LanguageError> {
        self.generate(prompt).await
    }

    async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value, LanguageError> {
        self.generate_structured(prompt).await
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================
