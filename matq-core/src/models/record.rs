use serde::{Deserialize, Serialize};

/// One table row. Columns are positional; no header semantics are inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub cells: Vec<String>,
}

impl Record {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, column: usize) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Single-string form of the row used for embedding.
    pub fn flatten(&self) -> String {
        self.cells.join(" ")
    }
}

/// A named table with a fixed column count, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub columns: usize,
    pub rows: Vec<Record>,
}

impl Relation {
    /// Build the relation for the `index`-th extracted table. Ragged rows are
    /// padded with empty cells up to the widest row.
    pub fn from_rows(index: usize, rows: Vec<Record>) -> Self {
        let columns = rows.iter().map(Record::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.cells.resize(columns, String::new());
                row
            })
            .collect();

        Self {
            name: table_name(index),
            columns,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn table_name(index: usize) -> String {
    format!("table_{index}")
}

pub fn column_name(index: usize) -> String {
    format!("col_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_pads_ragged_rows() {
        let relation = Relation::from_rows(
            3,
            vec![
                Record::new(["Steel", "Grade A", "ASTM A36"]),
                Record::new(["Copper"]),
            ],
        );

        assert_eq!(relation.name, "table_3");
        assert_eq!(relation.columns, 3);
        assert_eq!(relation.rows[1].cells, vec!["Copper", "", ""]);
    }

    #[test]
    fn test_flatten_joins_cells_with_single_spaces() {
        let record = Record::new(["Copper Wire", "Spec", "3"]);
        assert_eq!(record.flatten(), "Copper Wire Spec 3");
    }

    #[test]
    fn test_empty_relation_has_zero_columns() {
        let relation = Relation::from_rows(0, vec![]);
        assert_eq!(relation.columns, 0);
        assert!(relation.is_empty());
    }
}
