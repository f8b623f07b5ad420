//! Move audit entries.
//!
//! Every committed relocation appends exactly one [`MoveRecord`]; rows are never
//! updated or deleted.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveSource {
    QuickPair,
    Manual,
}

impl MoveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveSource::QuickPair => "quick_pair",
            MoveSource::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "quick_pair" => Ok(MoveSource::QuickPair),
            "manual" => Ok(MoveSource::Manual),
            other => Err(anyhow!("unknown move source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub id: String,
    pub spool_id: String,
    pub from_location_id: Option<String>,
    pub to_location_id: String,
    pub at: DateTime<Utc>,
    pub source: MoveSource,
}
