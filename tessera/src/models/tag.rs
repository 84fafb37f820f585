use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Emotions,
    Themes,
    CopingStrategies,
    RiskMarkers,
}

impl TagCategory {
    pub const ALL: [TagCategory; 4] = [
        TagCategory::Emotions,
        TagCategory::Themes,
        TagCategory::CopingStrategies,
        TagCategory::RiskMarkers,
    ];

    /// Categories compared when looking for recurring material across sessions.
    pub fn is_linkable(&self) -> bool {
        !matches!(self, TagCategory::RiskMarkers)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emotions => "emotions",
            Self::Themes => "themes",
            Self::CopingStrategies => "coping_strategies",
            Self::RiskMarkers => "risk_markers",
        }
    }
}

impl std::fmt::Display for TagCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "emotions" | "emotion" => Ok(Self::Emotions),
            "themes" | "theme" => Ok(Self::Themes),
            "coping_strategies" | "copingstrategies" | "coping" => Ok(Self::CopingStrategies),
            "risk_markers" | "riskmarkers" | "risks" => Ok(Self::RiskMarkers),
            _ => Err(format!("Unknown tag category: {s}")),
        }
    }
}

/// Labels of one category extracted from one note.
///
/// There is at most one per (`note_id`, `category`); re-tagging replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionTag {
    pub id: String,
    pub note_id: String,
    pub client_id: String,
    pub category: TagCategory,
    pub values: Vec<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parses_camel_and_snake_case() {
        assert_eq!(
            "copingStrategies".parse::<TagCategory>().unwrap(),
            TagCategory::CopingStrategies
        );
        assert_eq!(
            "risk_markers".parse::<TagCategory>().unwrap(),
            TagCategory::RiskMarkers
        );
        assert!("diagnoses".parse::<TagCategory>().is_err());
    }

    #[test]
    fn test_category_display_round_trip() {
        for category in TagCategory::ALL {
            assert_eq!(category.to_string().parse::<TagCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_risk_markers_are_not_linkable() {
        assert!(TagCategory::Themes.is_linkable());
        assert!(TagCategory::Emotions.is_linkable());
        assert!(TagCategory::CopingStrategies.is_linkable());
        assert!(!TagCategory::RiskMarkers.is_linkable());
    }
}
