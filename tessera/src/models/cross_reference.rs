use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LinkRelation {
    /// Two notes share tag values in at least one linkable category.
    RecurringTheme,
}

impl std::fmt::Display for LinkRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecurringTheme => write!(f, "recurring_theme"),
        }
    }
}

impl std::str::FromStr for LinkRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recurring_theme" => Ok(Self::RecurringTheme),
            _ => Err(format!("Unknown link relation: {s}")),
        }
    }
}

/// An undirected relation between two notes of the same client.
///
/// Endpoints are stored sorted (`source_note_id < target_note_id`) so the pair
/// is recorded once per relation; use [`CrossReference::other_endpoint`] to
/// traverse from either side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossReference {
    pub id: String,
    pub client_id: String,
    pub source_note_id: String,
    pub target_note_id: String,
    pub relation: LinkRelation,
    pub strength: u32,
    pub shared_values: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl CrossReference {
    pub fn other_endpoint(&self, note_id: &str) -> Option<&str> {
        if self.source_note_id == note_id {
            Some(&self.target_note_id)
        } else if self.target_note_id == note_id {
            Some(&self.source_note_id)
        } else {
            None
        }
    }
}

/// Sort two note ids into (source, target) order.
pub fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
