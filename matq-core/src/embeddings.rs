//! Sentence embeddings for the similarity fallback
//!
//! Provides an `EmbeddingBackend` trait with implementations for:
//! - **ONNX** — local `all-MiniLM-L6-v2` (384-dim), the default
//! - **Gemini** — batched cloud embeddings (768-dim), see [`crate::gemini`]
//! - **Gemini-lenient** — Gemini where a failed request yields `Ok(None)`
//!   for the affected texts instead of an error
//!
//! Table rows are embedded as documents, the question as a query.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::EmbeddingSettings;
use crate::gemini::{GeminiClient, GeminiConfig, LenientGeminiClient};

/// Default ONNX (all-MiniLM-L6-v2) embedding dimensions
pub const ONNX_DIMENSIONS: usize = 384;

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text. Returns `None` if embedding is unavailable
    /// (lenient backends degrade this way instead of failing).
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError>;

    /// Embed a search query. Backends with task-type hints override this.
    async fn embed_query(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        self.embed(text).await
    }

    /// Embed several texts; the result is index-aligned with `texts`.
    /// Backends with a batch endpoint override the one-by-one default.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Invalid response: sent {expected} texts, got {actual} embeddings")]
    BatchMismatch { expected: usize, actual: usize },

    #[error("Missing API key (set GOOGLE_API_KEY)")]
    MissingApiKey,

    #[error("Gave up after {retries} retries")]
    RetryExhausted { retries: usize },

    #[error("ONNX model not found at {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference error: {0}")]
    OnnxInference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Unknown embedding backend: {0} (expected onnx, gemini or gemini-lenient)")]
    UnknownBackend(String),
}

impl EmbeddingError {
    /// Network failures, rate limits and upstream 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Http(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::Api { code, .. } => *code == 429 || *code >= 500,
            EmbeddingError::RetryExhausted { .. } => true,
            _ => false,
        }
    }
}

/// ONNX backend configuration
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimensions: usize,
}

/// Configuration union for the backend factory.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Onnx(OnnxConfig),
    Gemini(GeminiConfig),
    GeminiLenient(GeminiConfig),
}

pub fn create_backend(config: BackendConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    match config {
        BackendConfig::Onnx(c) => Ok(Box::new(crate::onnx_embedder::OnnxEmbeddingClient::new(c)?)),
        BackendConfig::Gemini(c) => Ok(Box::new(GeminiClient::new(c)?)),
        BackendConfig::GeminiLenient(c) => Ok(Box::new(LenientGeminiClient::new(c)?)),
    }
}

/// Map the `[embedding]` config section to a backend config.
pub fn backend_config_from_settings(
    settings: &EmbeddingSettings,
) -> Result<BackendConfig, EmbeddingError> {
    let gemini = || {
        let mut config = GeminiConfig::new(
            None,
            settings.gemini_model.clone(),
            settings.gemini_dimensions as usize,
        );
        config.batch_size = settings.gemini_batch_size;
        config
    };

    match settings.backend.as_str() {
        "onnx" => {
            let (model_path, tokenizer_path) =
                crate::onnx_embedder::resolve_onnx_paths(&settings.onnx_model_path);
            Ok(BackendConfig::Onnx(OnnxConfig {
                model_path,
                tokenizer_path,
                dimensions: settings.onnx_dimensions as usize,
            }))
        }
        "gemini" => Ok(BackendConfig::Gemini(gemini())),
        "gemini-lenient" => Ok(BackendConfig::GeminiLenient(gemini())),
        other => Err(EmbeddingError::UnknownBackend(other.to_string())),
    }
}
