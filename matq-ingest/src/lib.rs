//! Document ingestion: tables out of a PDF, into the tabular store.

pub mod extract;
pub mod load;

pub use extract::{segment_tables, PdfTableExtractor, TableExtractor};
pub use load::{ingest_document, load_relations, IngestReport};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] matq_core::MatqError),
}
