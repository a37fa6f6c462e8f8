//! Fact store: entity name → attribute value, kept as labelled graph nodes
//!
//! Every fact is a node `(:<label> {name, value})`. Lookup is an exact match
//! on `name` within the label; when several nodes share a name the earliest
//! inserted one wins. Two backends implement [`FactStore`]:
//! - [`MemoryFactStore`] — process-local, insertion ordered
//! - [`PgFactStore`] — `fact_nodes` table in PostgreSQL

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::MatqError;
use crate::models::Fact;

/// Capability interface over the fact store backends.
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn add_fact(&self, name: &str, value: &str) -> Result<(), MatqError>;

    /// `Ok(None)` means "no such entity" and is a normal outcome; `Err` is
    /// reserved for backend failures.
    async fn lookup_fact(&self, name: &str) -> Result<Option<String>, MatqError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// MemoryFactStore
// ============================================================================

#[derive(Debug)]
pub struct MemoryFactStore {
    label: String,
    nodes: RwLock<Vec<Fact>>,
}

impl MemoryFactStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

impl Default for MemoryFactStore {
    fn default() -> Self {
        Self::new("Material")
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn add_fact(&self, name: &str, value: &str) -> Result<(), MatqError> {
        self.nodes
            .write()
            .await
            .push(Fact::new(&self.label, name, value));
        Ok(())
    }

    async fn lookup_fact(&self, name: &str) -> Result<Option<String>, MatqError> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .find(|f| f.label == self.label && f.name == name)
            .map(|f| f.value.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// PgFactStore
// ============================================================================

pub struct PgFactStore {
    pool: PgPool,
    label: String,
}

impl PgFactStore {
    /// Wrap a pool and make sure the node table exists.
    pub async fn connect(pool: PgPool, label: impl Into<String>) -> Result<Self, MatqError> {
        let store = Self {
            pool,
            label: label.into(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), MatqError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fact_nodes (
                seq BIGSERIAL,
                id UUID PRIMARY KEY,
                label TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS fact_nodes_label_name ON fact_nodes (label, name)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All nodes stored under `name`, oldest first.
    pub async fn facts_named(&self, name: &str) -> Result<Vec<Fact>, MatqError> {
        let facts = sqlx::query_as::<_, Fact>(
            r#"
            SELECT id, label, name, value, created_at
            FROM fact_nodes
            WHERE label = $1 AND name = $2
            ORDER BY seq
            "#,
        )
        .bind(&self.label)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(facts)
    }
}

#[async_trait]
impl FactStore for PgFactStore {
    async fn add_fact(&self, name: &str, value: &str) -> Result<(), MatqError> {
        let fact = Fact::new(&self.label, name, value);
        sqlx::query(
            r#"
            INSERT INTO fact_nodes (id, label, name, value, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(fact.id)
        .bind(&fact.label)
        .bind(&fact.name)
        .bind(&fact.value)
        .bind(fact.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(id = %fact.id, name = %name, "Stored fact node");
        Ok(())
    }

    async fn lookup_fact(&self, name: &str) -> Result<Option<String>, MatqError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value
            FROM fact_nodes
            WHERE label = $1 AND name = $2
            ORDER BY seq
            LIMIT 1
            "#,
        )
        .bind(&self.label)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// TESTS
// ============================================================================
