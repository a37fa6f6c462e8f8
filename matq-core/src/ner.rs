//! Named-entity recognition over the incoming question.
//!
//! The extractor tags every token with a CoNLL-03 label and keeps the tokens
//! whose label is accepted (miscellaneous and organization entities by
//! default). Their words, joined by single spaces, form the candidate entity
//! name used as the lookup key by the downstream stores.

use async_trait::async_trait;
use ort::session::Session;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::NerConfig;
use crate::onnx::{self, OnnxError};
use crate::onnx_embedder::resolve_model_paths;

/// Label order of the `bert-large-cased-finetuned-conll03-english` head.
pub const CONLL_LABELS: [&str; 9] = [
    "O", "B-MISC", "I-MISC", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC",
];

const DEFAULT_MODEL_STEM: &str = "bert-large-cased-conll03";

#[derive(Error, Debug)]
pub enum NerError {
    #[error("NER model not found at {path}")]
    ModelNotFound { path: String },

    #[error("NER inference error: {0}")]
    Inference(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model emits {actual} labels but {expected} are configured")]
    LabelMismatch { expected: usize, actual: usize },
}

impl From<OnnxError> for NerError {
    fn from(e: OnnxError) -> Self {
        match e {
            OnnxError::ModelNotFound { path } => NerError::ModelNotFound { path },
            OnnxError::Tokenizer(msg) => NerError::Tokenizer(msg),
            OnnxError::Session(msg) | OnnxError::Inference(msg) => NerError::Inference(msg),
        }
    }
}

/// Maps a free-text question to at most one candidate entity name.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// `Ok(None)` when no accepted span is found; that is not an error.
    async fn extract(&self, query: &str) -> Result<Option<String>, NerError>;

    /// Extractor name for logging.
    fn name(&self) -> &str;
}

/// Resolved model files and label setup for [`OnnxEntityExtractor`].
#[derive(Debug, Clone)]
pub struct NerModelConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub labels: Vec<String>,
    pub accepted_labels: Vec<String>,
}

impl NerModelConfig {
    pub fn from_settings(settings: &NerConfig) -> Self {
        let (model_path, tokenizer_path) =
            resolve_model_paths(&settings.model_path, DEFAULT_MODEL_STEM);
        Self {
            model_path,
            tokenizer_path,
            labels: settings.labels.clone(),
            accepted_labels: settings.accepted_labels.clone(),
        }
    }
}

/// One classified token.
#[derive(Debug, Clone, Copy)]
pub struct TaggedToken<'a> {
    pub piece: &'a str,
    pub word: Option<u32>,
    pub label: &'a str,
}

/// Token-classification NER running a BERT model through ONNX Runtime.
pub struct OnnxEntityExtractor {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    labels: Arc<Vec<String>>,
    accepted: Arc<HashSet<String>>,
}

impl std::fmt::Debug for OnnxEntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEntityExtractor")
            .field("labels", &self.labels)
            .field("accepted", &self.accepted)
            .finish_non_exhaustive()
    }
}

impl OnnxEntityExtractor {
    pub fn new(config: NerModelConfig) -> Result<Self, NerError> {
        onnx::ensure_exists(&config.model_path)?;
        onnx::ensure_exists(&config.tokenizer_path)?;

        let session = onnx::load_session(&config.model_path)?;
        let tokenizer = onnx::load_tokenizer(&config.tokenizer_path)?;

        tracing::info!(
            model = %config.model_path.display(),
            labels = config.labels.len(),
            accepted = ?config.accepted_labels,
            "Loaded NER model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            labels: Arc::new(config.labels),
            accepted: Arc::new(config.accepted_labels.into_iter().collect()),
        })
    }
}

#[async_trait]
impl EntityExtractor for OnnxEntityExtractor {
    async fn extract(&self, query: &str) -> Result<Option<String>, NerError> {
        if query.trim().is_empty() {
            return Ok(None);
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let labels = Arc::clone(&self.labels);
        let accepted = Arc::clone(&self.accepted);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| NerError::Inference(format!("session lock poisoned: {e}")))?;
            extract_sync(&mut session_guard, &tokenizer, &labels, &accepted, &query)
        })
        .await
        .map_err(|e| NerError::Inference(format!("spawn_blocking join error: {e}")))?
    }

    fn name(&self) -> &str {
        "onnx-ner"
    }
}

fn extract_sync(
    session: &mut Session,
    tokenizer: &tokenizers::Tokenizer,
    labels: &[String],
    accepted: &HashSet<String>,
    query: &str,
) -> Result<Option<String>, NerError> {
    let encoded = onnx::encode(tokenizer, query)?;
    let output = onnx::run_encoder(session, &encoded)?;
    let logits = output.per_token()?;

    if logits.ncols() != labels.len() {
        return Err(NerError::LabelMismatch {
            expected: labels.len(),
            actual: logits.ncols(),
        });
    }

    let tagged: Vec<TaggedToken<'_>> = logits
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !encoded.special.get(*idx).copied().unwrap_or(true))
        .map(|(idx, row)| TaggedToken {
            piece: &encoded.tokens[idx],
            word: encoded.word_ids.get(idx).copied().flatten(),
            label: &labels[argmax(row.iter().copied())],
        })
        .collect();

    let candidate = assemble_candidate(&tagged, accepted);
    tracing::debug!(query = %query, candidate = ?candidate, "NER candidate");
    Ok(candidate)
}

/// Index of the first maximum.
fn argmax(values: impl Iterator<Item = f32>) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (idx, v)| {
            if v > best.1 {
                (idx, v)
            } else {
                best
            }
        })
        .0
}

/// Join accepted tokens into a candidate name. Word pieces of the same word
/// are glued back together; separate words are joined with a single space.
pub fn assemble_candidate(
    tokens: &[TaggedToken<'_>],
    accepted: &HashSet<String>,
) -> Option<String> {
    let mut words: Vec<String> = Vec::new();
    let mut last: Option<(usize, Option<u32>)> = None;

    for (idx, token) in tokens.iter().enumerate() {
        if !accepted.contains(token.label) {
            continue;
        }
        let piece = token.piece.trim_start_matches("##");
        let continues_word = matches!(
            last,
            Some((prev_idx, Some(prev_word)))
                if prev_idx + 1 == idx && token.word == Some(prev_word)
        );

        match words.last_mut() {
            Some(word) if continues_word => word.push_str(piece),
            _ => words.push(piece.to_string()),
        }
        last = Some((idx, token.word));
    }

    let candidate = words.join(" ");
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> HashSet<String> {
        ["B-MISC", "I-MISC", "B-ORG", "I-ORG"]
            .iter()
            .map(|l| l.to_string())
            .collect()
    }

    fn tok<'a>(piece: &'a str, word: u32, label: &'a str) -> TaggedToken<'a> {
        TaggedToken {
            piece,
            word: Some(word),
            label,
        }
    }

    #[test]
    fn test_accepted_spans_joined_with_spaces() {
        let tokens = vec![
            tok("What", 0, "O"),
            tok("is", 1, "O"),
            tok("the", 2, "O"),
            tok("qualification", 3, "O"),
            tok("of", 4, "O"),
            tok("Titanium", 5, "B-MISC"),
            tok("Alloy", 6, "I-MISC"),
            tok("?", 7, "O"),
        ];

        assert_eq!(
            assemble_candidate(&tokens, &accepted()).as_deref(),
            Some("Titanium Alloy")
        );
    }

    #[test]
    fn test_word_pieces_are_glued() {
        let tokens = vec![
            tok("Ti", 0, "B-ORG"),
            tok("##tan", 0, "I-ORG"),
            tok("##ium", 0, "I-ORG"),
            tok("Alloy", 1, "I-ORG"),
        ];

        assert_eq!(
            assemble_candidate(&tokens, &accepted()).as_deref(),
            Some("Titanium Alloy")
        );
    }

    #[test]
    fn test_person_and_location_spans_are_ignored() {
        let tokens = vec![
            tok("Ask", 0, "O"),
            tok("Alice", 1, "B-PER"),
            tok("in", 2, "O"),
            tok("Berlin", 3, "B-LOC"),
        ];

        assert_eq!(assemble_candidate(&tokens, &accepted()), None);
    }

    #[test]
    fn test_separated_spans_are_concatenated() {
        let tokens = vec![
            tok("Steel", 0, "B-MISC"),
            tok("from", 1, "O"),
            tok("Acme", 2, "B-ORG"),
        ];

        assert_eq!(
            assemble_candidate(&tokens, &accepted()).as_deref(),
            Some("Steel Acme")
        );
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax([0.1, 0.9, 0.9, 0.2].into_iter()), 1);
        assert_eq!(argmax(std::iter::empty()), 0);
    }

    #[test]
    fn test_default_labels_match_conll_head() {
        let config = NerModelConfig::from_settings(&NerConfig::default());
        assert_eq!(config.labels.len(), CONLL_LABELS.len());
        assert!(config
            .model_path
            .to_string_lossy()
            .ends_with("bert-large-cased-conll03.onnx"));
    }

    #[test]
    fn test_missing_model_is_reported() {
        let config = NerModelConfig {
            model_path: PathBuf::from("/nonexistent/ner.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/ner-tokenizer.json"),
            labels: CONLL_LABELS.iter().map(|l| l.to_string()).collect(),
            accepted_labels: vec!["B-MISC".to_string()],
        };

        match OnnxEntityExtractor::new(config) {
            Err(NerError::ModelNotFound { path }) => assert!(path.contains("ner.onnx")),
            other => panic!("Expected ModelNotFound, got {other:?}"),
        }
    }
}
