use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    DataCompleteness, LinkRelation, SessionInsight, TagCategory, ValueFrequency,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagHit {
    pub category: TagCategory,
    pub value: String,
}

/// A note whose tag values or insight text contain the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectMatch {
    pub note_id: String,
    /// `None` when the source note has been removed since tagging.
    pub session_date: Option<NaiveDate>,
    pub relevance: f64,
    pub matched_tags: Vec<TagHit>,
    pub matched_insights: Vec<SessionInsight>,
    pub source_removed: bool,
}

/// An insight reached through a cross-reference from a direct match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedInsight {
    pub insight: SessionInsight,
    pub strength: u32,
    pub relation: LinkRelation,
    pub via_note_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecallResult {
    pub direct_matches: Vec<DirectMatch>,
    pub related_insights: Vec<RelatedInsight>,
    /// Tag values co-occurring with the query across the direct matches.
    pub patterns: Vec<ValueFrequency>,
    pub completeness: DataCompleteness,
}

impl RecallResult {
    pub fn is_empty(&self) -> bool {
        self.direct_matches.is_empty() && self.related_insights.is_empty()
    }
}
