use std::sync::Arc;

use async_trait::async_trait;
use matq_core::{Answer, MatqError, TabularStore};

use crate::resolver::{QueryContext, ResolutionStrategy};

/// Looks the candidate up as a key in column 0 of the first relation.
pub struct ExactMatch {
    tabular: Arc<TabularStore>,
}

impl ExactMatch {
    pub fn new(tabular: Arc<TabularStore>) -> Self {
        Self { tabular }
    }
}

#[async_trait]
impl ResolutionStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    async fn try_resolve(&self, ctx: &QueryContext<'_>) -> Result<Option<Answer>, MatqError> {
        // No candidate means no key; there is nothing to compare against.
        let Some(key) = ctx.candidate else {
            return Ok(None);
        };

        let value = self.tabular.lookup_exact(key).await?;
        Ok(value
            .filter(|v| !v.is_empty())
            .map(|value| Answer::Attribute { value }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matq_core::{Record, Relation};

    async fn strategy() -> ExactMatch {
        let mut store = TabularStore::in_memory().await.unwrap();
        store
            .load_relation(&Relation::from_rows(
                0,
                vec![
                    Record::new(["Steel", "Grade A"]),
                    Record::new(["Copper", ""]),
                ],
            ))
            .await
            .unwrap();
        ExactMatch::new(Arc::new(store))
    }

    fn ctx(candidate: Option<&str>) -> QueryContext<'_> {
        QueryContext {
            query: "What is the qualification?",
            candidate,
        }
    }

    #[tokio::test]
    async fn test_matching_key_returns_second_column() {
        let answer = strategy().await.try_resolve(&ctx(Some("Steel"))).await.unwrap();
        assert_eq!(
            answer,
            Some(Answer::Attribute {
                value: "Grade A".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_empty_value_and_missing_candidate_fall_through() {
        let exact = strategy().await;
        assert!(exact.try_resolve(&ctx(Some("Copper"))).await.unwrap().is_none());
        assert!(exact.try_resolve(&ctx(None)).await.unwrap().is_none());
        assert!(exact.try_resolve(&ctx(Some("steel"))).await.unwrap().is_none());
    }
}
