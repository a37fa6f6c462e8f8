use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel printed when no strategy produced an answer.
pub const NO_DATA: &str = "No data found.";

/// The answer to a query, one variant per way a lookup can succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Found in the fact store.
    Fact { entity: String, value: String },
    /// Second column of an exact match in the first relation.
    Attribute { value: String },
    /// Row with the highest cosine similarity to the query.
    ClosestMatch { text: String, score: f32 },
    NoData,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Fact { entity, value } => {
                write!(f, "The qualification of {entity} is {value}.")
            }
            Answer::Attribute { value } => f.write_str(value),
            Answer::ClosestMatch { text, .. } => write!(f, "Closest match: {text}"),
            Answer::NoData => f.write_str(NO_DATA),
        }
    }
}
