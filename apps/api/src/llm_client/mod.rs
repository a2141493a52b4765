/// LLM Client — the single point of entry for all Gemini API calls in FitCheck.
///
/// ARCHITECTURAL RULE: No other module may call the Gemini API directly.
/// Callers depend on the `InferenceProvider` trait; `GeminiClient` is the
/// production implementation.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const API_VERSION: &str = "v1beta";
/// The generation method a model must advertise to be usable for analysis.
pub const GENERATE_METHOD: &str = "generateContent";
const MAX_RETRIES: u32 = 3;

/// Provider failure category, assigned once at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    InvalidRequest,
    Unauthorized,
    NotFound,
    RateLimited,
    Unavailable,
    /// Any status without a canonical mapping.
    Collaborator,
}

impl ProviderErrorKind {
    /// The one mapping from upstream HTTP status to local error kind.
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest,
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            s if (500..600).contains(&s) => Self::Unavailable,
            _ => Self::Collaborator,
        }
    }

    fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable)
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        kind: ProviderErrorKind,
        status: u16,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {retries} retries")]
    RetriesExhausted { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            LlmError::Api { kind, .. } => *kind,
            LlmError::Http(_) | LlmError::RetriesExhausted { .. } => ProviderErrorKind::Unavailable,
            LlmError::Parse(_) | LlmError::EmptyContent => ProviderErrorKind::Collaborator,
        }
    }

    pub fn is_model_not_found(&self) -> bool {
        self.kind() == ProviderErrorKind::NotFound
    }
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

/// A model advertised by the provider's listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Bare identifier, without the `models/` prefix.
    pub id: String,
    pub supported_operations: Vec<String>,
}

impl ModelInfo {
    pub fn supports(&self, operation: &str) -> bool {
        self.supported_operations.iter().any(|op| op == operation)
    }
}

/// Inference capability used by the analyzer. Swappable for tests.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: &'a GenerationParams,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ListedModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl From<ListedModel> for ModelInfo {
    fn from(model: ListedModel) -> Self {
        let id = model
            .name
            .strip_prefix("models/")
            .unwrap_or(&model.name)
            .to_string();
        ModelInfo {
            id,
            supported_operations: model.supported_generation_methods,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

/// Gemini REST client with retry on rate limiting and server errors.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    backoff_base: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: &str) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            backoff_base: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sends a request built by `build`, retrying 429 and 5xx with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, LlmError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1x, 2x of the base delay
                let delay = self.backoff_base * (1 << (attempt - 1));
                warn!(
                    "Gemini call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build()
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let kind = ProviderErrorKind::from_status(status);
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            let error = LlmError::Api {
                kind,
                status: status.as_u16(),
                message,
            };

            if !kind.is_retryable() {
                return Err(error);
            }
            warn!("Gemini API returned {}: {}", status, error);
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(LlmError::RetriesExhausted {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/{API_VERSION}/models", self.base_url);
        let response = self
            .send_with_retry(|| self.client.get(&url).query(&[("pageSize", "1000")]))
            .await?;
        let listing: ListModelsResponse = response.json().await?;

        debug!("Gemini listed {} models", listing.models.len());
        Ok(listing.models.into_iter().map(ModelInfo::from).collect())
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/{API_VERSION}/models/{model}:{GENERATE_METHOD}",
            self.base_url
        );
        let body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: params,
        };

        let response = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;
        let payload: GenerateContentResponse = response.json().await?;

        if let Some(usage) = &payload.usage_metadata {
            debug!(
                "Gemini call succeeded: model={}, prompt_tokens={:?}, output_tokens={:?}",
                model, usage.prompt_token_count, usage.candidates_token_count
            );
        }

        payload.text().ok_or(LlmError::EmptyContent)
    }
}
