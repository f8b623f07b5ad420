use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One manual weighing of a spool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightRecord {
    pub id: String,
    pub spool_id: String,
    pub weight_grams: f64,
    pub at: DateTime<Utc>,
}
