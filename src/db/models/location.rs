use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A place a spool can live: a dry box, an AMS slot, the dryer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub label: String,
    pub capacity: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
