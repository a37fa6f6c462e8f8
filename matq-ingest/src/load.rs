use std::path::Path;
use std::sync::Arc;

use matq_core::{Relation, TabularStore};

use crate::extract::TableExtractor;
use crate::IngestError;

/// Outcome of loading one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub document: String,
    pub tables: usize,
    pub rows: usize,
}

/// Load relations into the store in order. Relations without columns are
/// skipped with a warning.
pub async fn load_relations(
    store: &mut TabularStore,
    relations: &[Relation],
) -> Result<usize, IngestError> {
    let mut rows = 0;
    for relation in relations {
        if relation.columns == 0 {
            tracing::warn!(relation = %relation.name, "Skipping relation without columns");
            continue;
        }
        let info = store.load_relation(relation).await?;
        rows += info.rows;
    }
    Ok(rows)
}

/// Extract the tables of `path` and load them into `store`.
pub async fn ingest_document(
    extractor: Arc<dyn TableExtractor>,
    path: &Path,
    store: &mut TabularStore,
) -> Result<IngestReport, IngestError> {
    // Extraction is CPU-bound — run on the blocking thread pool.
    let relations = {
        let extractor = Arc::clone(&extractor);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extractor.extract_tables(&path)).await??
    };

    let rows = load_relations(store, &relations).await?;
    let report = IngestReport {
        document: path.display().to_string(),
        tables: relations.len(),
        rows,
    };

    tracing::info!(
        document = %report.document,
        extractor = extractor.name(),
        tables = report.tables,
        rows = report.rows,
        "Document ingested"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matq_core::Record;

    struct FixedTables(Vec<Relation>);

    impl TableExtractor for FixedTables {
        fn extract_tables(&self, _path: &Path) -> Result<Vec<Relation>, IngestError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_ingest_loads_every_table_in_order() {
        let extractor = Arc::new(FixedTables(vec![
            Relation::from_rows(
                0,
                vec![Record::new(["Steel", "Grade A"]), Record::new(["Copper", "C110"])],
            ),
            Relation::from_rows(1, vec![Record::new(["Copper Wire Spec 3"])]),
        ]));
        let mut store = TabularStore::in_memory().await.unwrap();

        let report = ingest_document(extractor, Path::new("materials.pdf"), &mut store)
            .await
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                document: "materials.pdf".to_string(),
                tables: 2,
                rows: 3,
            }
        );
        assert_eq!(store.relations().len(), 2);
        assert_eq!(store.lookup_exact("Steel").await.unwrap().as_deref(), Some("Grade A"));
    }

    #[tokio::test]
    async fn test_column_less_relations_are_skipped() {
        let mut store = TabularStore::in_memory().await.unwrap();
        let relations = vec![
            Relation::from_rows(0, vec![]),
            Relation::from_rows(1, vec![Record::new(["Steel", "Grade A"])]),
        ];

        let rows = load_relations(&mut store, &relations).await.unwrap();

        assert_eq!(rows, 1);
        assert_eq!(store.relations()[0].name, "table_0");
        assert_eq!(store.lookup_exact("Steel").await.unwrap().as_deref(), Some("Grade A"));
    }

    #[tokio::test]
    async fn test_extraction_failure_propagates() {
        let extractor = Arc::new(crate::PdfTableExtractor::default());
        let mut store = TabularStore::in_memory().await.unwrap();

        let err = ingest_document(extractor, Path::new("/nonexistent/materials.pdf"), &mut store)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::NotFound(_)));
        assert!(store.relations().is_empty());
    }
}
