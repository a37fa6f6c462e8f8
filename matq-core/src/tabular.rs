//! Tabular store — extracted tables as SQLite relations
//!
//! Relation `i` is stored as `table_{i}` with TEXT columns `col_0 .. col_{n-1}`
//! in load order. Relations are written once at startup and only read after
//! that. Table and column identifiers are generated here, never taken from
//! input; cell values and lookup keys always go through bind parameters.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::db;
use crate::error::MatqError;
use crate::models::record::{column_name, table_name};
use crate::models::{Record, Relation};

/// Handle to one loaded relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationInfo {
    pub name: String,
    pub columns: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct TabularStore {
    pool: SqlitePool,
    relations: Vec<RelationInfo>,
}

impl TabularStore {
    pub async fn connect(url: &str) -> Result<Self, MatqError> {
        let pool = db::create_tabular_pool(url).await?;
        Ok(Self {
            pool,
            relations: Vec::new(),
        })
    }

    /// Fresh private in-memory database.
    pub async fn in_memory() -> Result<Self, MatqError> {
        Self::connect("sqlite::memory:").await
    }

    pub fn relations(&self) -> &[RelationInfo] {
        &self.relations
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Materialize `relation` as the next `table_{i}`. Returns its handle.
    pub async fn load_relation(&mut self, relation: &Relation) -> Result<RelationInfo, MatqError> {
        let name = table_name(self.relations.len());

        if relation.columns == 0 {
            return Err(MatqError::InvalidRelation {
                relation: name,
                reason: "relation has no columns".to_string(),
            });
        }
        if let Some(row) = relation.rows.iter().find(|r| r.len() != relation.columns) {
            return Err(MatqError::InvalidRelation {
                relation: name,
                reason: format!(
                    "row has {} cells, relation has {} columns",
                    row.len(),
                    relation.columns
                ),
            });
        }

        let columns: Vec<String> = (0..relation.columns).map(column_name).collect();
        let create = format!(
            "CREATE TABLE {name} ({})",
            columns
                .iter()
                .map(|c| format!("{c} TEXT"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let insert = format!(
            "INSERT INTO {name} ({}) VALUES ({})",
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&create).execute(&mut *tx).await?;
        for row in &relation.rows {
            let mut query = sqlx::query(&insert);
            for cell in &row.cells {
                query = query.bind(cell.as_str());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        let info = RelationInfo {
            name,
            columns: relation.columns,
            rows: relation.rows.len(),
        };
        tracing::debug!(
            relation = %info.name,
            columns = info.columns,
            rows = info.rows,
            "Loaded relation"
        );
        self.relations.push(info.clone());
        Ok(info)
    }

    /// Exact match on column 0 of the first relation; returns column 1 of
    /// the first matching row in load order.
    ///
    /// `Ok(None)` when nothing is loaded, the first relation has fewer than
    /// two columns, or no row matches.
    pub async fn lookup_exact(&self, key: &str) -> Result<Option<String>, MatqError> {
        let first = match self.relations.first() {
            Some(r) if r.columns >= 2 => r,
            _ => return Ok(None),
        };

        let sql = format!(
            "SELECT {value} FROM {table} WHERE {key_col} = ? ORDER BY rowid LIMIT 1",
            value = column_name(1),
            table = first.name,
            key_col = column_name(0),
        );
        let row: Option<(Option<String>,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value.unwrap_or_default()))
    }

    /// Every row of every relation, relation by relation in load order.
    pub async fn all_rows(&self) -> Result<Vec<Record>, MatqError> {
        let mut records = Vec::new();

        for relation in &self.relations {
            let sql = format!(
                "SELECT {} FROM {} ORDER BY rowid",
                (0..relation.columns)
                    .map(column_name)
                    .collect::<Vec<_>>()
                    .join(", "),
                relation.name
            );
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

            for row in rows {
                let cells = (0..relation.columns)
                    .map(|i| {
                        row.try_get::<Option<String>, _>(i)
                            .map(Option::unwrap_or_default)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                records.push(Record { cells });
            }
        }

        Ok(records)
    }

    pub fn row_count(&self) -> usize {
        self.relations.iter().map(|r| r.rows).sum()
    }
}
