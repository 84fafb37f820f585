use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Breakthrough,
    Pattern,
    Risk,
    Milestone,
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Breakthrough => write!(f, "breakthrough"),
            Self::Pattern => write!(f, "pattern"),
            Self::Risk => write!(f, "risk"),
            Self::Milestone => write!(f, "milestone"),
        }
    }
}

impl std::str::FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "breakthrough" => Ok(Self::Breakthrough),
            "pattern" => Ok(Self::Pattern),
            "risk" => Ok(Self::Risk),
            "milestone" => Ok(Self::Milestone),
            _ => Err(format!("Unknown insight type: {s}")),
        }
    }
}

/// A sentence-level observation extracted from a note. Additive: a note may
/// carry many, de-duplicated by exact text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInsight {
    pub id: String,
    pub note_id: String,
    pub client_id: String,
    pub insight_type: InsightType,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
