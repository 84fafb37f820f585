use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{frequencies_as_map, DataCompleteness, ValueFrequency};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryPoint {
    pub session_date: NaiveDate,
    pub emotions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProgressIndicators {
    pub breakthrough_count: usize,
    pub pattern_count: usize,
    pub risk_count: usize,
    pub milestone_count: usize,
}

/// Cached aggregate over one client's tags and insights for an inclusive
/// session-date range. Derived data: always regenerable from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JourneySynthesis {
    pub client_id: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub dominant_themes: Vec<ValueFrequency>,
    pub emotional_trajectory: Vec<TrajectoryPoint>,
    pub progress_indicators: ProgressIndicators,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
    /// Max `created_at` among the tags and insights that went into this document.
    pub source_tag_version: Option<DateTime<Utc>>,
    pub completeness: DataCompleteness,
}

impl JourneySynthesis {
    /// Stale when the store holds a tag or insight newer than anything
    /// included here.
    pub fn is_stale_against(&self, latest_source: Option<DateTime<Utc>>) -> bool {
        match (latest_source, self.source_tag_version) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(latest), Some(version)) => version < latest,
        }
    }

    pub fn dominant_themes_map(&self) -> HashMap<String, usize> {
        frequencies_as_map(&self.dominant_themes)
    }
}
