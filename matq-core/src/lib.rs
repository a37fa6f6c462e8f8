pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod gemini;
pub mod graph;
pub mod models;
pub mod ner;
pub mod onnx;
pub mod onnx_embedder;
pub mod similarity;
pub mod tabular;

pub use config::MatqConfig;
pub use embeddings::{
    backend_config_from_settings, create_backend, BackendConfig, EmbeddingBackend,
    EmbeddingError, OnnxConfig, ONNX_DIMENSIONS,
};
pub use error::MatqError;
pub use gemini::{GeminiClient, GeminiConfig, LenientGeminiClient, Purpose, GEMINI_DIMENSIONS};
pub use graph::{FactStore, MemoryFactStore, PgFactStore};
pub use models::{Answer, Fact, Record, Relation, NO_DATA};
pub use ner::{EntityExtractor, NerError, NerModelConfig, OnnxEntityExtractor};
pub use onnx_embedder::OnnxEmbeddingClient;
pub use tabular::{RelationInfo, TabularStore};
