//! Semantic fallback — nearest table row to the question
//!
//! Every row of every relation is flattened to its cells joined by single
//! spaces and embedded once, on first use. Each query is then embedded and
//! compared to the cached row vectors by cosine similarity; the first row
//! with the highest score wins. Rows whose embedding degraded are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use matq_core::similarity::best_match;
use matq_core::{Answer, EmbeddingBackend, EmbeddingError, MatqError, Record, TabularStore};
use tokio::sync::OnceCell;

use crate::resolver::{QueryContext, ResolutionStrategy};

/// Flattened row texts and their embeddings, index-aligned.
struct RowIndex {
    texts: Vec<String>,
    embeddings: Vec<Option<Vec<f32>>>,
}

pub struct SemanticFallback {
    tabular: Arc<TabularStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    index: OnceCell<RowIndex>,
}

impl SemanticFallback {
    pub fn new(tabular: Arc<TabularStore>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            tabular,
            embedder,
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&RowIndex, MatqError> {
        self.index
            .get_or_try_init(|| async {
                let texts: Vec<String> = self
                    .tabular
                    .all_rows()
                    .await?
                    .iter()
                    .map(Record::flatten)
                    .collect();
                let embeddings = self.embedder.embed_batch(&texts).await?;
                if embeddings.len() != texts.len() {
                    return Err(MatqError::Embedding(EmbeddingError::BatchMismatch {
                        expected: texts.len(),
                        actual: embeddings.len(),
                    }));
                }

                let degraded = embeddings.iter().filter(|e| e.is_none()).count();
                tracing::info!(
                    backend = self.embedder.name(),
                    rows = texts.len(),
                    degraded = degraded,
                    "Row embeddings cached"
                );

                Ok::<_, MatqError>(RowIndex { texts, embeddings })
            })
            .await
    }
}

#[async_trait]
impl ResolutionStrategy for SemanticFallback {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn try_resolve(&self, ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError> {
        let index = self.index().await?;
        if index.texts.is_empty() {
            return Ok(None);
        }

        let Some(query) = self.embedder.embed_query(ctx.query).await? else {
            tracing::warn!(backend = self.embedder.name(), "Query embedding unavailable");
            return Ok(None);
        };

        Ok(best_match(&query, &index.embeddings).and_then(|(idx, score)| {
            tracing::debug!(row = idx, score = score, "Closest row");
            index.texts.get(idx).map(|text| Answer::ClosestMatch {
                text: text.clone(),
                score,
            })
        }))
    }
}
