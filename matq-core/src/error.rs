use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::ner::NerError;

#[derive(Error, Debug)]
pub enum MatqError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Entity extraction error: {0}")]
    Ner(#[from] NerError),

    #[error("Relation {relation} is invalid: {reason}")]
    InvalidRelation { relation: String, reason: String },
}

impl MatqError {
    /// True for failures that may succeed on a later attempt (unreachable
    /// database, exhausted pool, rate limiting, upstream 5xx). Lookup misses
    /// are never errors, so everything else is treated as permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MatqError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            MatqError::Embedding(e) => e.is_transient(),
            _ => false,
        }
    }
}
