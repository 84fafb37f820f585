use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TesseraError};
use crate::models::{InsightType, TagCategory};

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Validated values for one tag category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedCategory {
    pub category: TagCategory,
    pub values: Vec<String>,
    pub confidence: f64,
}

/// Tags for one note. Only non-empty categories are kept, in
/// `TagCategory::ALL` order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTags {
    pub categories: Vec<ExtractedCategory>,
}

impl ExtractedTags {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, category: TagCategory) -> Option<&ExtractedCategory> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Validate a raw capability response.
    ///
    /// Accepts flat lists per category with either a single overall
    /// `confidence` or a per-category confidence object, and per-category
    /// `{"values": [...], "confidence": x}` objects. Keys may be camelCase or
    /// snake_case. Unknown keys are dropped.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(malformed("tag response is not a JSON object"));
        };

        let shared_confidence = map.get("confidence");
        let mut found: Vec<ExtractedCategory> = Vec::new();
        let mut recognised = false;

        for (key, raw) in map {
            if key == "confidence" {
                continue;
            }

            let category = match key.parse::<TagCategory>() {
                Ok(category) => category,
                Err(_) => {
                    tracing::debug!(key = %key, "Dropping unrecognised tag category");
                    continue;
                }
            };
            recognised = true;

            let (raw_values, own_confidence) = match raw {
                Value::Array(_) | Value::String(_) | Value::Null => (raw, None),
                Value::Object(inner) => (
                    inner.get("values").unwrap_or(&Value::Null),
                    inner.get("confidence"),
                ),
                _ => {
                    return Err(malformed(&format!(
                        "category {key} has unexpected type"
                    )))
                }
            };

            let values = clean_values(raw_values)?;
            if values.is_empty() {
                continue;
            }

            let confidence = own_confidence
                .and_then(Value::as_f64)
                .or_else(|| category_confidence(shared_confidence, key, category))
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0);

            match found.iter_mut().find(|c| c.category == category) {
                // Both spellings of the same category present: merge
                Some(existing) => {
                    for value in values {
                        if !existing
                            .values
                            .iter()
                            .any(|v| v.to_lowercase() == value.to_lowercase())
                        {
                            existing.values.push(value);
                        }
                    }
                }
                None => found.push(ExtractedCategory {
                    category,
                    values,
                    confidence,
                }),
            }
        }

        if !recognised {
            return Err(malformed("tag response contains no known category"));
        }

        found.sort_by_key(|c| {
            TagCategory::ALL
                .iter()
                .position(|known| *known == c.category)
                .unwrap_or(usize::MAX)
        });

        Ok(Self { categories: found })
    }
}

fn category_confidence(shared: Option<&Value>, key: &str, category: TagCategory) -> Option<f64> {
    match shared? {
        Value::Number(n) => n.as_f64(),
        Value::Object(per_category) => per_category
            .get(key)
            .or_else(|| per_category.get(category.as_str()))
            .or_else(|| lookup_by_category(per_category, category))
            .and_then(Value::as_f64),
        _ => None,
    }
}

fn lookup_by_category(map: &Map<String, Value>, category: TagCategory) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.parse::<TagCategory>().ok() == Some(category))
        .map(|(_, v)| v)
}

/// Trim, drop empties, drop case-insensitive duplicates keeping the first spelling.
fn clean_values(raw: &Value) -> Result<Vec<String>> {
    let candidates: Vec<&str> = match raw {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return Err(malformed("tag values are not a list")),
    };

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            values.push(trimmed.to_string());
        }
    }
    Ok(values)
}

/// A validated insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInsight {
    pub insight_type: InsightType,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawInsight {
    #[serde(rename = "type", alias = "insight_type", alias = "insightType", default)]
    insight_type: Option<String>,
    #[serde(alias = "content", default)]
    text: Option<String>,
}

/// Models return either `[...]` or `{"insights": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum InsightsResponse {
    Array(Vec<RawInsight>),
    Wrapped {
        #[serde(alias = "items", alias = "results")]
        insights: Vec<RawInsight>,
    },
}

impl ExtractedInsight {
    /// Validate a raw capability response. Unknown types and empty texts are
    /// dropped; exact duplicate texts collapse to the first occurrence.
    pub fn list_from_value(value: Value) -> Result<Vec<Self>> {
        let raw = match serde_json::from_value::<InsightsResponse>(value) {
            Ok(InsightsResponse::Array(items)) => items,
            Ok(InsightsResponse::Wrapped { insights }) => insights,
            Err(error) => {
                return Err(malformed(&format!("insight response has wrong shape: {error}")))
            }
        };

        let mut seen = HashSet::new();
        let mut insights = Vec::new();
        for item in raw {
            let Some(text) = item.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
            else {
                continue;
            };
            let Some(insight_type) = item
                .insight_type
                .and_then(|t| t.parse::<InsightType>().ok())
            else {
                tracing::debug!(text = %text, "Dropping insight with unknown type");
                continue;
            };
            if seen.insert(text.clone()) {
                insights.push(ExtractedInsight { insight_type, text });
            }
        }
        Ok(insights)
    }
}

fn malformed(detail: &str) -> TesseraError {
    TesseraError::ExtractionUnavailable(format!("malformed response: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_flat_response_with_shared_confidence() {
        let tags = ExtractedTags::from_value(&json!({
            "emotions": ["Anxiety", " anxiety ", "relief", ""],
            "themes": ["work stress"],
            "copingStrategies": [],
            "riskMarkers": [],
            "confidence": 0.8
        }))
        .unwrap();

        assert_eq!(tags.categories.len(), 2);
        let emotions = tags.get(TagCategory::Emotions).unwrap();
        assert_eq!(emotions.values, vec!["Anxiety", "relief"]);
        assert_eq!(emotions.confidence, 0.8);
        assert!(tags.get(TagCategory::CopingStrategies).is_none());
    }

    #[test]
    fn test_per_category_objects_and_confidence_map() {
        let tags = ExtractedTags::from_value(&json!({
            "coping_strategies": {"values": ["journaling"], "confidence": 1.7},
            "themes": ["family"],
            "confidence": {"themes": 0.6}
        }))
        .unwrap();

        assert_eq!(tags.categories[0].category, TagCategory::Themes);
        assert_eq!(tags.categories[0].confidence, 0.6);
        assert_eq!(tags.categories[1].category, TagCategory::CopingStrategies);
        assert_eq!(tags.categories[1].confidence, 1.0);
    }

    #[test]
    fn test_unknown_categories_are_dropped_and_default_confidence_applies() {
        let tags = ExtractedTags::from_value(&json!({
            "themes": ["boundaries"],
            "diagnoses": ["gad"]
        }))
        .unwrap();

        assert_eq!(tags.categories.len(), 1);
        assert_eq!(tags.categories[0].confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_wrong_shapes_are_errors_not_empty() {
        assert!(ExtractedTags::from_value(&json!(["anxiety"])).is_err());
        assert!(ExtractedTags::from_value(&json!({"summary": "fine"})).is_err());
        assert!(ExtractedTags::from_value(&json!({"emotions": 3})).is_err());
    }

    #[test]
    fn test_empty_but_well_formed_is_ok() {
        let tags = ExtractedTags::from_value(&json!({
            "emotions": [], "themes": [], "coping_strategies": [], "risk_markers": []
        }))
        .unwrap();
        assert!(tags.is_empty());
    }

    #[test]
    fn test_insights_array_and_wrapped() {
        let bare = ExtractedInsight::list_from_value(json!([
            {"type": "breakthrough", "text": "Named the fear"},
            {"type": "epiphany", "text": "Dropped"},
            {"type": "pattern", "text": "  "},
            {"insightType": "milestone", "content": "First week sober"},
            {"type": "breakthrough", "text": "Named the fear"}
        ]))
        .unwrap();
        assert_eq!(
            bare,
            vec![
                ExtractedInsight {
                    insight_type: InsightType::Breakthrough,
                    text: "Named the fear".to_string()
                },
                ExtractedInsight {
                    insight_type: InsightType::Milestone,
                    text: "First week sober".to_string()
                },
            ]
        );

        let wrapped = ExtractedInsight::list_from_value(json!({
            "insights": [{"type": "risk", "text": "Passive ideation mentioned"}]
        }))
        .unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].insight_type, InsightType::Risk);
    }

    #[test]
    fn test_insight_wrong_shape_is_error() {
        assert!(ExtractedInsight::list_from_value(json!({"text": "no list"})).is_err());
        assert!(ExtractedInsight::list_from_value(json!("nothing")).is_err());
        assert!(ExtractedInsight::list_from_value(json!([])).unwrap().is_empty());
    }
}
