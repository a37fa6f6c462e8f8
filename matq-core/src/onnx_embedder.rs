//! ONNX embedding backend — local inference via `all-MiniLM-L6-v2`
//!
//! Uses the `ort` crate for ONNX Runtime and `tokenizers` for WordPiece
//! tokenization. Produces 384-dimensional sentence embeddings entirely offline,
//! so the similarity fallback works without network access.

use async_trait::async_trait;
use ndarray::Array1;
use ort::session::Session;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::embeddings::{EmbeddingBackend, EmbeddingError, OnnxConfig};
use crate::onnx::{self, OnnxError};

impl From<OnnxError> for EmbeddingError {
    fn from(e: OnnxError) -> Self {
        match e {
            OnnxError::ModelNotFound { path } => EmbeddingError::ModelNotFound { path },
            OnnxError::Tokenizer(msg) => EmbeddingError::Tokenizer(msg),
            OnnxError::Session(msg) | OnnxError::Inference(msg) => {
                EmbeddingError::OnnxInference(msg)
            }
        }
    }
}

/// Local ONNX embedding client using `all-MiniLM-L6-v2`.
pub struct OnnxEmbeddingClient {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    dimensions: usize,
}

impl std::fmt::Debug for OnnxEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingClient")
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingClient {
    /// Load the model and tokenizer named in `config`.
    ///
    /// Returns `EmbeddingError::ModelNotFound` if either file is missing.
    pub fn new(config: OnnxConfig) -> Result<Self, EmbeddingError> {
        onnx::ensure_exists(&config.model_path)?;
        onnx::ensure_exists(&config.tokenizer_path)?;

        let session = onnx::load_session(&config.model_path)?;
        let tokenizer = onnx::load_tokenizer(&config.tokenizer_path)?;

        tracing::info!(
            model = %config.model_path.display(),
            dimensions = config.dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, EmbeddingError> {
        // ONNX inference is CPU-bound — run on the blocking thread pool.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let dimensions = self.dimensions;
        let text = text.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| EmbeddingError::OnnxInference(format!("session lock poisoned: {e}")))?;
            embed_sync(&mut session_guard, &tokenizer, &text, dimensions)
        })
        .await
        .map_err(|e| EmbeddingError::OnnxInference(format!("spawn_blocking join error: {e}")))?;

        result.map(Some)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn embed_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    text: &str,
    expected_dims: usize,
) -> Result<Vec<f32>, EmbeddingError> {
    let encoded = onnx::encode(tokenizer, text)?;
    let output = onnx::run_encoder(session, &encoded)?;
    let hidden = output.per_token()?;

    let pooled = mean_pool(hidden, &encoded.attention_mask);

    if pooled.len() != expected_dims {
        return Err(EmbeddingError::InvalidDimensions {
            expected: expected_dims,
            actual: pooled.len(),
        });
    }

    Ok(pooled)
}

/// Attention-masked mean over token states, L2-normalized.
fn mean_pool(hidden: ndarray::ArrayView2<'_, f32>, attention_mask: &[i64]) -> Vec<f32> {
    let mut pooled = Array1::<f32>::zeros(hidden.ncols());
    let mut count = 0usize;

    for (state, &mask) in hidden.rows().into_iter().zip(attention_mask) {
        if mask > 0 {
            pooled += &state;
            count += 1;
        }
    }
    if count > 0 {
        pooled /= count as f32;
    }

    let norm = pooled.dot(&pooled).sqrt();
    if norm > 0.0 {
        pooled /= norm;
    }

    pooled.to_vec()
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("matq/models")
}

/// Resolve paths for the ONNX model and tokenizer.
///
/// If `onnx_model_path` from config is empty, uses the default location.
pub fn resolve_onnx_paths(onnx_model_path: &str) -> (PathBuf, PathBuf) {
    resolve_model_paths(onnx_model_path, "all-MiniLM-L6-v2")
}

/// Resolve a model file and its sibling `<stem>-tokenizer.json`.
///
/// An empty `configured` path selects `<default_model_dir>/<default_stem>.onnx`.
pub fn resolve_model_paths(configured: &str, default_stem: &str) -> (PathBuf, PathBuf) {
    if configured.is_empty() {
        let dir = default_model_dir();
        (
            dir.join(format!("{default_stem}.onnx")),
            dir.join(format!("{default_stem}-tokenizer.json")),
        )
    } else {
        let model = PathBuf::from(crate::config::expand_path(configured));
        let stem = model
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
        (model, tokenizer)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{OnnxConfig, ONNX_DIMENSIONS};

    #[test]
    fn test_model_not_found_returns_error() {
        let config = OnnxConfig {
            model_path: PathBuf::from("/nonexistent/minilm.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/minilm-tokenizer.json"),
            dimensions: ONNX_DIMENSIONS,
        };

        let result = OnnxEmbeddingClient::new(config);
        assert!(result.is_err());
        match result.unwrap_err() {
            EmbeddingError::ModelNotFound { path } => {
                assert!(path.contains("nonexistent"), "path was: {path}");
            }
            other => panic!("Expected ModelNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn test_default_model_dir_is_namespaced() {
        let dir = default_model_dir();
        assert!(
            dir.to_string_lossy().ends_with("matq/models"),
            "Expected matq/models in path, got: {}",
            dir.display()
        );
    }

    #[test]
    fn test_resolve_onnx_paths_default() {
        let (model, tokenizer) = resolve_onnx_paths("");
        assert!(model.to_string_lossy().ends_with("all-MiniLM-L6-v2.onnx"));
        assert!(tokenizer
            .to_string_lossy()
            .ends_with("all-MiniLM-L6-v2-tokenizer.json"));
    }

    #[test]
    fn test_resolve_onnx_paths_custom() {
        let (model, tokenizer) = resolve_onnx_paths("/opt/models/minilm.onnx");
        assert_eq!(model, PathBuf::from("/opt/models/minilm.onnx"));
        assert_eq!(tokenizer, PathBuf::from("/opt/models/minilm-tokenizer.json"));
    }

    #[test]
    fn test_resolve_model_paths_uses_default_stem() {
        let (model, tokenizer) = resolve_model_paths("", "bert-large-cased-conll03");
        assert!(model.to_string_lossy().ends_with("matq/models/bert-large-cased-conll03.onnx"));
        assert!(tokenizer
            .to_string_lossy()
            .ends_with("bert-large-cased-conll03-tokenizer.json"));
    }

    #[test]
    fn test_mean_pool_ignores_masked_tokens_and_normalizes() {
        let data = vec![3.0, 0.0, 0.0, 4.0, 100.0, 100.0];
        let hidden = ndarray::ArrayView2::from_shape((3, 2), &data).unwrap();

        let pooled = mean_pool(hidden, &[1, 1, 0]);

        // mean of [3,0] and [0,4] is [1.5, 2.0], norm 2.5
        assert!((pooled[0] - 0.6).abs() < 1e-6);
        assert!((pooled[1] - 0.8).abs() < 1e-6);
    }
}
