use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ScanKind {
    Spool,
    Location,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Spool => "spool",
            ScanKind::Location => "location",
        }
    }

    pub fn complement(&self) -> ScanKind {
        match self {
            ScanKind::Spool => ScanKind::Location,
            ScanKind::Location => ScanKind::Spool,
        }
    }
}

/// A classified scan. Lives only until the pairing window consumes or expires it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    pub kind: ScanKind,
    pub code: String,
    /// Monotonic capture time; all window arithmetic uses this.
    pub observed_at: Instant,
    /// Wall-clock capture time, used to stamp audit records.
    pub captured_at: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(kind: ScanKind, code: impl Into<String>, observed_at: Instant) -> Self {
        Self {
            kind,
            code: code.into(),
            observed_at,
            captured_at: Utc::now(),
        }
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }
}
