//! Pipeline bootstrap — configuration to a ready `QueryResolver`
//!
//! Collaborators are built here, once, by the caller and handed to the
//! resolver; nothing is loaded lazily at import time.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use matq_core::config::{expand_path, SeedFact};
use matq_core::{
    backend_config_from_settings, create_backend, EmbeddingBackend, EmbeddingError,
    EntityExtractor, FactStore, MatqConfig, MatqError, MemoryFactStore, NerError, NerModelConfig,
    OnnxEntityExtractor, PgFactStore, TabularStore,
};
use matq_ingest::{ingest_document, IngestError, PdfTableExtractor};
use thiserror::Error;

use crate::resolver::{QueryResolver, ResolutionStrategy};
use crate::strategies::{ExactMatch, GraphLookup, SemanticFallback};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown resolver strategy: {0} (expected graph, exact or semantic)")]
    UnknownStrategy(String),

    #[error("Resolver strategy listed twice: {0}")]
    DuplicateStrategy(String),

    #[error("Unknown fact store backend: {0} (expected memory or postgres)")]
    UnknownFactBackend(String),

    #[error("The semantic strategy needs an embedding backend")]
    MissingEmbedder,

    #[error(transparent)]
    Store(#[from] MatqError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Ner(#[from] NerError),
}

impl PipelineError {
    /// True when bootstrap failed on something that may come back, such as
    /// an unreachable fact database or a rate-limited embedding API.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_transient(),
            PipelineError::Ingest(IngestError::Store(e)) => e.is_transient(),
            PipelineError::Embedding(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Graph,
    Exact,
    Semantic,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Graph => "graph",
            StrategyKind::Exact => "exact",
            StrategyKind::Semantic => "semantic",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graph" => Ok(StrategyKind::Graph),
            "exact" => Ok(StrategyKind::Exact),
            "semantic" => Ok(StrategyKind::Semantic),
            _ => Err(PipelineError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Parse `resolver.order`. Unknown names and repeats are rejected.
pub fn parse_order(names: &[String]) -> Result<Vec<StrategyKind>, PipelineError> {
    let mut order = Vec::with_capacity(names.len());
    for name in names {
        let kind: StrategyKind = name.parse()?;
        if order.contains(&kind) {
            return Err(PipelineError::DuplicateStrategy(kind.as_str().to_string()));
        }
        order.push(kind);
    }
    Ok(order)
}

/// The shared stores and models strategies are built from.
pub struct Collaborators {
    pub facts: Arc<dyn FactStore>,
    pub tabular: Arc<TabularStore>,
    /// Only needed when the order contains `semantic`.
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
}

pub fn build_strategies(
    order: &[StrategyKind],
    collaborators: &Collaborators,
) -> Result<Vec<Box<dyn ResolutionStrategy>>, PipelineError> {
    let mut strategies = Vec::with_capacity(order.len());
    for kind in order {
        let strategy: Box<dyn ResolutionStrategy> = match kind {
            StrategyKind::Graph => Box::new(GraphLookup::new(Arc::clone(&collaborators.facts))),
            StrategyKind::Exact => Box::new(ExactMatch::new(Arc::clone(&collaborators.tabular))),
            StrategyKind::Semantic => {
                let embedder = collaborators
                    .embedder
                    .as_ref()
                    .ok_or(PipelineError::MissingEmbedder)?;
                Box::new(SemanticFallback::new(
                    Arc::clone(&collaborators.tabular),
                    Arc::clone(embedder),
                ))
            }
        };
        strategies.push(strategy);
    }
    Ok(strategies)
}

pub fn build_resolver(
    order: &[StrategyKind],
    extractor: Arc<dyn EntityExtractor>,
    collaborators: &Collaborators,
) -> Result<QueryResolver, PipelineError> {
    let strategies = build_strategies(order, collaborators)?;
    let resolver = QueryResolver::new(extractor, strategies);
    tracing::info!(order = ?resolver.strategy_names(), "Resolver ready");
    Ok(resolver)
}

/// Open the configured fact store backend.
pub async fn create_fact_store(
    config: &MatqConfig,
) -> Result<Arc<dyn FactStore>, PipelineError> {
    match config.facts.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryFactStore::new(config.facts.label.clone()))),
        "postgres" => {
            let pool = matq_core::db::create_pool(&config.database)
                .await
                .map_err(MatqError::from)?;
            let store = PgFactStore::connect(pool, config.facts.label.clone()).await?;
            Ok(Arc::new(store))
        }
        other => Err(PipelineError::UnknownFactBackend(other.to_string())),
    }
}

pub async fn seed_facts(facts: &dyn FactStore, seed: &[SeedFact]) -> Result<usize, MatqError> {
    for fact in seed {
        facts.add_fact(&fact.name, &fact.value).await?;
    }
    tracing::info!(store = facts.name(), facts = seed.len(), "Seeded fact store");
    Ok(seed.len())
}

/// Open the tabular store and load the configured document into it.
///
/// A missing document leaves the store empty so queries still resolve
/// (to `No data found.` unless the fact store answers).
pub async fn load_tabular_store(config: &MatqConfig) -> Result<TabularStore, PipelineError> {
    let mut store = TabularStore::connect(&config.tabular.url).await?;
    let path = expand_path(&config.document.path);
    let extractor = Arc::new(PdfTableExtractor::new(config.document.min_columns));

    match ingest_document(extractor, Path::new(&path), &mut store).await {
        Ok(_) => {}
        Err(IngestError::NotFound(path)) => {
            tracing::warn!(document = %path, "Document not found, tabular store left empty");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(store)
}

pub fn create_embedder(config: &MatqConfig) -> Result<Arc<dyn EmbeddingBackend>, PipelineError> {
    let backend = create_backend(backend_config_from_settings(&config.embedding)?)?;
    tracing::info!(
        backend = backend.name(),
        dimensions = backend.dimensions(),
        "Embedding backend ready"
    );
    Ok(Arc::from(backend))
}

pub fn create_entity_extractor(
    config: &MatqConfig,
) -> Result<Arc<dyn EntityExtractor>, PipelineError> {
    let extractor = OnnxEntityExtractor::new(NerModelConfig::from_settings(&config.ner))?;
    Ok(Arc::new(extractor))
}

/// Build every collaborator named by the configuration and assemble the
/// resolver.
pub async fn bootstrap(config: &MatqConfig) -> Result<QueryResolver, PipelineError> {
    let order = parse_order(&config.resolver.order)?;

    let facts = create_fact_store(config).await?;
    seed_facts(facts.as_ref(), &config.facts.seed).await?;

    let tabular = Arc::new(load_tabular_store(config).await?);

    let embedder = if order.contains(&StrategyKind::Semantic) {
        Some(create_embedder(config)?)
    } else {
        None
    };

    let extractor = create_entity_extractor(config)?;

    build_resolver(
        &order,
        extractor,
        &Collaborators {
            facts,
            tabular,
            embedder,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_default_order() {
        let order = parse_order(&names(&["graph", "exact", "semantic"])).unwrap();
        assert_eq!(
            order,
            vec![StrategyKind::Graph, StrategyKind::Exact, StrategyKind::Semantic]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_duplicates() {
        assert!(matches!(
            parse_order(&names(&["graph", "fuzzy"])),
            Err(PipelineError::UnknownStrategy(name)) if name == "fuzzy"
        ));
        assert!(matches!(
            parse_order(&names(&["exact", "Exact"])),
            Err(PipelineError::DuplicateStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_semantic_without_embedder_is_rejected() {
        let collaborators = Collaborators {
            facts: Arc::new(MemoryFactStore::default()),
            tabular: Arc::new(TabularStore::in_memory().await.unwrap()),
            embedder: None,
        };

        let err = build_strategies(&[StrategyKind::Semantic], &collaborators)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::MissingEmbedder));

        let strategies =
            build_strategies(&[StrategyKind::Graph, StrategyKind::Exact], &collaborators).unwrap();
        let names: Vec<_> = strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["graph", "exact"]);
    }

    #[tokio::test]
    async fn test_unknown_fact_backend() {
        let mut config = MatqConfig::default();
        config.facts.backend = "neo4j".to_string();

        assert!(matches!(
            create_fact_store(&config).await.err(),
            Some(PipelineError::UnknownFactBackend(name)) if name == "neo4j"
        ));
    }

    #[tokio::test]
    async fn test_seed_facts_fill_memory_store() {
        let store = MemoryFactStore::default();
        let seeded = seed_facts(&store, &MatqConfig::default().facts.seed)
            .await
            .unwrap();

        assert_eq!(seeded, 1);
        assert_eq!(
            store.lookup_fact("Titanium Alloy").await.unwrap().as_deref(),
            Some("Grade 5")
        );
    }

    #[tokio::test]
    async fn test_missing_document_leaves_store_empty() {
        let mut config = MatqConfig::default();
        config.document.path = "/nonexistent/materials.pdf".to_string();

        let store = load_tabular_store(&config).await.unwrap();
        assert!(store.relations().is_empty());
    }

    #[test]
    fn test_unreachable_database_is_transient() {
        let pool_timeout = PipelineError::from(MatqError::Database(sqlx::Error::PoolTimedOut));
        assert!(pool_timeout.is_transient());

        let during_load = PipelineError::from(IngestError::Store(MatqError::Database(
            sqlx::Error::PoolClosed,
        )));
        assert!(during_load.is_transient());

        let rate_limited = PipelineError::from(EmbeddingError::Api {
            code: 429,
            message: "Resource has been exhausted".to_string(),
        });
        assert!(rate_limited.is_transient());
    }

    #[test]
    fn test_configuration_errors_are_permanent() {
        assert!(!PipelineError::UnknownStrategy("fuzzy".to_string()).is_transient());
        assert!(!PipelineError::MissingEmbedder.is_transient());
        assert!(!PipelineError::from(EmbeddingError::MissingApiKey).is_transient());
        assert!(!PipelineError::from(IngestError::NotFound("a.pdf".to_string())).is_transient());
    }
}
