use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entity attribute stored as a labelled graph node.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fact {
    pub id: Uuid,
    pub label: String,
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl Fact {
    pub fn new(label: &str, name: &str, value: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            created_at: Utc::now(),
        }
    }
}
