//! Gemini embeddings over the `batchEmbedContents` endpoint
//!
//! Table rows go out in chunks of `batch_size` texts per request, tagged
//! `RETRIEVAL_DOCUMENT`; the question goes out alone as `RETRIEVAL_QUERY`.
//! A request that fails transiently (connect/timeout, 429, 5xx) is retried
//! with jittered exponential backoff. Any other failure is returned at once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::embeddings::{EmbeddingBackend, EmbeddingError};

/// Default Gemini embedding dimensions
pub const GEMINI_DIMENSIONS: usize = 768;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Most requests the API accepts in one batch call.
pub const MAX_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    /// Texts per request, clamped to `1..=MAX_BATCH`.
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl GeminiConfig {
    /// A missing `api_key` is read from `GOOGLE_API_KEY`.
    pub fn new(api_key: Option<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            api_key: api_key
                .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
                .unwrap_or_default(),
            model: model.into(),
            dimensions,
            batch_size: MAX_BATCH,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Gemini task type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purpose {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: Purpose,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    code: u16,
    message: String,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
    base_url: String,
    /// `models/<model>`, as the request body expects it.
    model_path: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(config, GEMINI_ENDPOINT)
    }

    /// Point the client at another endpoint (tests, proxies).
    pub fn with_base_url(
        config: GeminiConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let model_path = format!("models/{}", config.model);

        Ok(Self {
            http,
            config,
            base_url: base_url.into(),
            model_path,
        })
    }

    /// Embed `texts` in order, one request per chunk. The result is
    /// index-aligned with `texts`.
    pub async fn embed_texts(
        &self,
        texts: &[String],
        purpose: Purpose,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let chunk_size = self.config.batch_size.clamp(1, MAX_BATCH);
        let mut vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(chunk_size) {
            let backoff = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
                .max_delay(Duration::from_secs(10))
                .map(jitter)
                .take(self.config.max_retries);

            let embedded = RetryIf::spawn(
                backoff,
                || self.request_batch(chunk, purpose),
                EmbeddingError::is_transient,
            )
            .await
            .map_err(|e| self.give_up(e))?;

            vectors.extend(embedded);
        }

        tracing::debug!(
            texts = texts.len(),
            requests = texts.len().div_ceil(chunk_size),
            purpose = ?purpose,
            "Gemini batch embedded"
        );
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str, purpose: Purpose) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_texts(&texts, purpose).await?;
        vectors.pop().ok_or(EmbeddingError::BatchMismatch {
            expected: 1,
            actual: 0,
        })
    }

    fn give_up(&self, e: EmbeddingError) -> EmbeddingError {
        if e.is_transient() {
            tracing::error!(
                retries = self.config.max_retries,
                error = %e,
                "Gemini request still failing after retries"
            );
            EmbeddingError::RetryExhausted {
                retries: self.config.max_retries,
            }
        } else {
            e
        }
    }

    async fn request_batch(
        &self,
        chunk: &[String],
        purpose: Purpose,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/{}:batchEmbedContents", self.base_url, self.model_path);
        let body = BatchRequest {
            requests: chunk
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model_path,
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type: purpose,
                    output_dimensionality: self.config.dimensions,
                })
                .collect(),
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ApiErrorBody>(&raw) {
                Ok(parsed) => (parsed.error.code, parsed.error.message),
                Err(_) => (status.as_u16(), raw),
            };
            tracing::warn!(code = code, message = %message, "Gemini API error");
            return Err(EmbeddingError::Api { code, message });
        }

        let parsed: BatchResponse = response.json().await?;
        if parsed.embeddings.len() != chunk.len() {
            return Err(EmbeddingError::BatchMismatch {
                expected: chunk.len(),
                actual: parsed.embeddings.len(),
            });
        }

        parsed
            .embeddings
            .into_iter()
            .map(|e| {
                if e.values.len() == self.config.dimensions {
                    Ok(e.values)
                } else {
                    Err(EmbeddingError::InvalidDimensions {
                        expected: self.config.dimensions,
                        actual: e.values.len(),
                    })
                }
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed_one(text, Purpose::RetrievalDocument).await.map(Some)
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed_one(text, Purpose::RetrievalQuery).await.map(Some)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
        let vectors = self.embed_texts(texts, Purpose::RetrievalDocument).await?;
        Ok(vectors.into_iter().map(Some).collect())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Gemini client that never fails: texts it cannot embed come back as
/// `None` and drop out of similarity ranking.
#[derive(Debug, Clone)]
pub struct LenientGeminiClient {
    inner: GeminiClient,
}

impl LenientGeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            inner: GeminiClient::new(config)?,
        })
    }

    pub fn with_base_url(
        config: GeminiConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            inner: GeminiClient::with_base_url(config, base_url)?,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for LenientGeminiClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        match self.inner.embed_one(text, Purpose::RetrievalDocument).await {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(error = %e, "Row embedding unavailable, row skipped");
                Ok(None)
            }
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        match self.inner.embed_one(text, Purpose::RetrievalQuery).await {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding unavailable");
                Ok(None)
            }
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
        match self.inner.embed_texts(texts, Purpose::RetrievalDocument).await {
            Ok(vectors) => Ok(vectors.into_iter().map(Some).collect()),
            Err(e) => {
                tracing::warn!(rows = texts.len(), error = %e, "Row embeddings unavailable");
                Ok(vec![None; texts.len()])
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "gemini-lenient"
    }
}
