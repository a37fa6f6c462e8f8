use std::sync::Arc;

use async_trait::async_trait;
use matq_core::{Answer, FactStore, MatqError};

use crate::resolver::{QueryContext, ResolutionStrategy};

/// Answers from the fact store when the query names a known entity.
pub struct GraphLookup {
    facts: Arc<dyn FactStore>,
}

impl GraphLookup {
    pub fn new(facts: Arc<dyn FactStore>) -> Self {
        Self { facts }
    }
}

#[async_trait]
impl ResolutionStrategy for GraphLookup {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn try_resolve(&self, ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError> {
        let Some(entity) = ctx.candidate else {
            return Ok(None);
        };

        let value = self.facts.lookup_fact(entity).await?;
        tracing::debug!(
            store = self.facts.name(),
            entity = %entity,
            found = value.is_some(),
            "Fact lookup"
        );

        Ok(value.filter(|v| !v.is_empty()).map(|value| Answer::Fact {
            entity: entity.to_string(),
            value,
        }))
    }
}
