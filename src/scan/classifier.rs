use std::{collections::HashMap, time::Instant};

use chrono::{DateTime, Utc};

use crate::{error::ScanRejection, settings::StationConfig};

use super::event::{ScanEvent, ScanKind};

/// Turns raw QR payloads into typed scan events.
///
/// Matching order: exact configured location codes, then location prefixes, then
/// spool prefixes. Location wins so a spool prefix broad enough to swallow a
/// location URL cannot turn a shelf into a spool.
#[derive(Debug, Clone)]
pub struct ScanClassifier {
    location_names: HashMap<String, String>,
    location_prefixes: Vec<String>,
    spool_prefixes: Vec<String>,
}

impl ScanClassifier {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            location_names: config
                .locations
                .iter()
                .map(|loc| (loc.qr.trim().to_string(), loc.name.clone()))
                .collect(),
            location_prefixes: trimmed(&config.location_code_prefixes),
            spool_prefixes: trimmed(&config.spool_code_prefixes),
        }
    }

    pub fn classify(
        &self,
        raw_payload: &str,
        observed_at: Instant,
        captured_at: DateTime<Utc>,
    ) -> Result<ScanEvent, ScanRejection> {
        let payload = raw_payload.trim();
        if payload.is_empty() {
            return Err(ScanRejection::UnrecognizedFormat(String::new()));
        }

        let kind = self
            .kind_of(payload)
            .ok_or_else(|| ScanRejection::UnrecognizedFormat(payload.to_string()))?;

        Ok(ScanEvent::new(kind, payload, observed_at).with_captured_at(captured_at))
    }

    /// Configured display name for an exact location code.
    pub fn location_name(&self, code: &str) -> Option<&str> {
        self.location_names.get(code).map(String::as_str)
    }

    fn kind_of(&self, payload: &str) -> Option<ScanKind> {
        if self.location_names.contains_key(payload)
            || has_identifier_after_prefix(payload, &self.location_prefixes)
        {
            return Some(ScanKind::Location);
        }
        if has_identifier_after_prefix(payload, &self.spool_prefixes) {
            return Some(ScanKind::Spool);
        }
        None
    }
}

fn trimmed(prefixes: &[String]) -> Vec<String> {
    prefixes
        .iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}

// A bare prefix ("fs://loc/") names nothing.
fn has_identifier_after_prefix(payload: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        payload
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| !rest.trim_matches('/').is_empty())
    })
}
