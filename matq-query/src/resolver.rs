//! Query resolution — ordered fallback over lookup strategies
//!
//! 1. Entity extraction turns the question into a candidate name (or none)
//! 2. Each strategy is tried in order; the first answer wins
//! 3. If no strategy answers, the result is `Answer::NoData`
//!
//! Nothing is retried. A strategy that finds nothing returns `Ok(None)` and
//! resolution falls through; a strategy whose backend fails stops resolution
//! with a `ResolveError` so misses and outages are never confused.

use std::sync::Arc;

use async_trait::async_trait;
use matq_core::{Answer, EntityExtractor, MatqError, NerError};
use serde::Serialize;
use thiserror::Error;

/// What a strategy sees of the query.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub query: &'a str,
    pub candidate: Option<&'a str>,
}

/// One step of the fallback chain.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// Strategy name for logging and for `Resolution::strategy`.
    fn name(&self) -> &'static str;

    async fn try_resolve(&self, ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError>;
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Entity extraction failed: {0}")]
    Extraction(#[from] NerError),

    #[error("Strategy '{strategy}' failed: {source}")]
    Strategy {
        strategy: &'static str,
        #[source]
        source: MatqError,
    },
}

impl ResolveError {
    /// Whether retrying the whole query later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ResolveError::Extraction(_) => false,
            ResolveError::Strategy { source, .. } => source.is_transient(),
        }
    }
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub query: String,
    pub candidate: Option<String>,
    /// Strategy that produced the answer; `None` for `NoData`.
    pub strategy: Option<&'static str>,
    pub answer: Answer,
    /// The answer as printed.
    pub text: String,
}

impl Resolution {
    fn new(
        query: &str,
        candidate: Option<String>,
        strategy: Option<&'static str>,
        answer: Answer,
    ) -> Self {
        Self {
            query: query.to_string(),
            candidate,
            strategy,
            text: answer.to_string(),
            answer,
        }
    }
}

pub struct QueryResolver {
    extractor: Arc<dyn EntityExtractor>,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl QueryResolver {
    pub fn new(
        extractor: Arc<dyn EntityExtractor>,
        strategies: Vec<Box<dyn ResolutionStrategy>>,
    ) -> Self {
        Self {
            extractor,
            strategies,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, query: &str) -> Result<Resolution, ResolveError> {
        let candidate = self.extractor.extract(query).await?;
        tracing::info!(
            extractor = self.extractor.name(),
            candidate = ?candidate,
            "Entity extraction complete"
        );

        let ctx = QueryContext {
            query,
            candidate: candidate.as_deref(),
        };

        for strategy in &self.strategies {
            match strategy.try_resolve(&ctx).await {
                Ok(Some(answer)) => {
                    tracing::info!(strategy = strategy.name(), "Query resolved");
                    return Ok(Resolution::new(query, candidate, Some(strategy.name()), answer));
                }
                Ok(None) => {
                    tracing::debug!(strategy = strategy.name(), "No answer, falling through");
                }
                Err(source) => {
                    tracing::error!(
                        strategy = strategy.name(),
                        transient = source.is_transient(),
                        error = %source,
                        "Strategy failed"
                    );
                    return Err(ResolveError::Strategy {
                        strategy: strategy.name(),
                        source,
                    });
                }
            }
        }

        tracing::info!("No strategy produced an answer");
        Ok(Resolution::new(query, candidate, None, Answer::NoData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matq_core::EmbeddingError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedExtractor(Option<&'static str>);

    #[async_trait]
    impl EntityExtractor for FixedExtractor {
        async fn extract(&self, _query: &str) -> Result<Option<String>, NerError> {
            Ok(self.0.map(str::to_string))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Scripted {
        name: &'static str,
        answer: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResolutionStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn try_resolve(&self, _ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.map(|v| Answer::Attribute {
                value: v.to_string(),
            }))
        }
    }

    struct Broken;

    #[async_trait]
    impl ResolutionStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn try_resolve(&self, _ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError> {
            Err(MatqError::Embedding(EmbeddingError::Api {
                code: 503,
                message: "unavailable".to_string(),
            }))
        }
    }

    fn scripted(
        name: &'static str,
        answer: Option<&'static str>,
    ) -> (Box<dyn ResolutionStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                name,
                answer,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn test_first_answer_wins_and_later_steps_never_run() {
        let (first, first_calls) = scripted("first", None);
        let (second, second_calls) = scripted("second", Some("Grade A"));
        let (third, third_calls) = scripted("third", Some("unused"));
        let resolver = QueryResolver::new(
            Arc::new(FixedExtractor(Some("Steel"))),
            vec![first, second, third],
        );

        let resolution = resolver.resolve("What about Steel?").await.unwrap();

        assert_eq!(resolution.text, "Grade A");
        assert_eq!(resolution.strategy, Some("second"));
        assert_eq!(resolution.candidate.as_deref(), Some("Steel"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_no_data() {
        let (only, _) = scripted("only", None);
        let resolver = QueryResolver::new(Arc::new(FixedExtractor(None)), vec![only]);

        let resolution = resolver.resolve("anything").await.unwrap();

        assert_eq!(resolution.answer, Answer::NoData);
        assert_eq!(resolution.text, "No data found.");
        assert!(resolution.strategy.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error_not_a_miss() {
        let (after, after_calls) = scripted("after", Some("unused"));
        let resolver = QueryResolver::new(
            Arc::new(FixedExtractor(Some("Steel"))),
            vec![Box::new(Broken), after],
        );

        let err = resolver.resolve("What about Steel?").await.unwrap_err();

        assert!(matches!(err, ResolveError::Strategy { strategy: "broken", .. }));
        assert!(err.is_transient());
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_strategy_names_follow_order() {
        let (a, _) = scripted("graph", None);
        let (b, _) = scripted("exact", None);
        let resolver = QueryResolver::new(Arc::new(FixedExtractor(None)), vec![a, b]);
        assert_eq!(resolver.strategy_names(), vec!["graph", "exact"]);
    }
}
