//! Spool records held by the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Spool {
    /// Trimmed QR payload; stable for the life of the spool.
    pub id: String,
    pub name: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub current_location_id: Option<String>,
    pub weight_grams: Option<f64>,
    /// Set when the record was created by a scan rather than by an operator.
    pub provisional: bool,
    pub last_moved_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Spool {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Spool")
    }
}

/// Operator-supplied spool metadata. `None` fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpoolInput {
    pub id: String,
    pub name: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
}

/// Best-effort display name for a spool created from a bare scan:
/// `https://example.com/spools/pla-basic-red/` becomes `Pla Basic Red`.
pub fn guess_spool_name(code: &str) -> Option<String> {
    let segment = code.trim_end_matches('/').rsplit('/').next()?;
    let words: Vec<String> = segment
        .split(|c: char| c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_name_from_last_path_segment() {
        assert_eq!(
            guess_spool_name("https://3dfilamentprofiles.com/spools/pla-basic-red/"),
            Some("Pla Basic Red".to_string())
        );
        assert_eq!(
            guess_spool_name("fs://spool/PETG_black"),
            Some("Petg Black".to_string())
        );
    }

    #[test]
    fn no_name_for_empty_segment() {
        assert_eq!(guess_spool_name("///"), None);
        assert_eq!(guess_spool_name("--"), None);
    }
}
