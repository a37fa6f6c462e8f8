//! ONNX Runtime plumbing shared by the BERT-style encoders (sentence
//! embedding and token classification).

use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("model not found at {path}")]
    ModelNotFound { path: String },

    #[error("session error: {0}")]
    Session(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("inference error: {0}")]
    Inference(String),
}

/// Tokenizer output for a single text, in the shapes the encoders need.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub tokens: Vec<String>,
    pub word_ids: Vec<Option<u32>>,
    pub special: Vec<bool>,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Raw output tensor copied out of the session.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

pub fn ensure_exists(path: &Path) -> Result<(), OnnxError> {
    if path.exists() {
        Ok(())
    } else {
        Err(OnnxError::ModelNotFound {
            path: path.display().to_string(),
        })
    }
}

pub fn load_session(model_path: &Path) -> Result<Session, OnnxError> {
    ensure_exists(model_path)?;
    Session::builder()
        .and_then(|b| b.with_intra_threads(1))
        .and_then(|b| b.commit_from_file(model_path))
        .map_err(|e| OnnxError::Session(e.to_string()))
}

pub fn load_tokenizer(tokenizer_path: &Path) -> Result<tokenizers::Tokenizer, OnnxError> {
    ensure_exists(tokenizer_path)?;
    tokenizers::Tokenizer::from_file(tokenizer_path)
        .map_err(|e| OnnxError::Tokenizer(e.to_string()))
}

pub fn encode(tokenizer: &tokenizers::Tokenizer, text: &str) -> Result<Encoded, OnnxError> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| OnnxError::Tokenizer(e.to_string()))?;

    Ok(Encoded {
        input_ids: encoding.get_ids().iter().map(|&id| id as i64).collect(),
        attention_mask: encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect(),
        token_type_ids: encoding.get_type_ids().iter().map(|&t| t as i64).collect(),
        tokens: encoding.get_tokens().to_vec(),
        word_ids: encoding.get_word_ids().to_vec(),
        special: encoding
            .get_special_tokens_mask()
            .iter()
            .map(|&s| s == 1)
            .collect(),
    })
}

/// Run a batch-of-one encoder pass and copy out the first output tensor.
pub fn run_encoder(session: &mut Session, encoded: &Encoded) -> Result<EncoderOutput, OnnxError> {
    let shape = vec![1i64, encoded.len() as i64];
    let tensor = |values: &[i64]| {
        Tensor::from_array((shape.clone(), values.to_vec()))
            .map_err(|e| OnnxError::Inference(e.to_string()))
    };

    let inputs = ort::inputs! {
        "input_ids" => tensor(&encoded.input_ids)?,
        "attention_mask" => tensor(&encoded.attention_mask)?,
        "token_type_ids" => tensor(&encoded.token_type_ids)?,
    };

    let outputs = session
        .run(inputs)
        .map_err(|e| OnnxError::Inference(e.to_string()))?;

    let (out_shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| OnnxError::Inference(e.to_string()))?;

    Ok(EncoderOutput {
        shape: out_shape.iter().map(|&d| d as usize).collect(),
        data: data.to_vec(),
    })
}

impl EncoderOutput {
    /// View a `[1, seq_len, width]` output as a `seq_len x width` matrix.
    pub fn per_token(&self) -> Result<ndarray::ArrayView2<'_, f32>, OnnxError> {
        if self.shape.len() != 3 || self.shape[0] != 1 {
            return Err(OnnxError::Inference(format!(
                "Expected [1, seq_len, width] output, got {:?}",
                self.shape
            )));
        }
        ndarray::ArrayView2::from_shape((self.shape[1], self.shape[2]), &self.data)
            .map_err(|e| OnnxError::Inference(e.to_string()))
    }
}
