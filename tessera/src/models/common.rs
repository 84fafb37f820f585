use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Format a timestamp for storage.
///
/// Fixed-width microsecond precision with a `Z` suffix, so lexical order of the
/// stored strings is chronological order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to the precision used in storage, so values written
/// and read back compare equal.
pub fn now_timestamp() -> DateTime<Utc> {
    let now = Utc::now();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Case and whitespace normalisation used wherever tag values are compared.
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// A value and how often it occurred. Lists of these are ordered by count
/// descending, ties by first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFrequency {
    pub value: String,
    pub count: usize,
}

/// Count values in encounter order and rank them.
///
/// The sort is stable, so equal counts keep the order in which each value was
/// first seen.
pub fn rank_frequencies<I, S>(values: I) -> Vec<ValueFrequency>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut ranked: Vec<ValueFrequency> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for value in values {
        let value = value.into();
        match index.get(&value) {
            Some(&pos) => ranked[pos].count += 1,
            None => {
                index.insert(value.clone(), ranked.len());
                ranked.push(ValueFrequency { value, count: 1 });
            }
        }
    }

    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

pub fn frequencies_as_map(frequencies: &[ValueFrequency]) -> HashMap<String, usize> {
    frequencies
        .iter()
        .map(|f| (f.value.clone(), f.count))
        .collect()
}

/// Tagging lifecycle of a single note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaggingState {
    #[default]
    Pending,
    Tagged,
    /// Extraction exhausted its retry budget. Stored as `tagging_failed`.
    #[serde(rename = "tagging_failed")]
    Failed,
}

impl std::fmt::Display for TaggingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Tagged => write!(f, "tagged"),
            Self::Failed => write!(f, "tagging_failed"),
        }
    }
}

impl std::str::FromStr for TaggingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "tagged" => Ok(Self::Tagged),
            "tagging_failed" | "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown tagging state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaggingStatus {
    pub note_id: String,
    pub client_id: String,
    pub state: TaggingState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// How much of the notes in scope actually contributed derived data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DataCompleteness {
    pub total_notes: usize,
    pub tagged_notes: usize,
    pub pending_note_ids: Vec<String>,
    pub failed_note_ids: Vec<String>,
    pub is_complete: bool,
}

impl DataCompleteness {
    pub fn from_states<'a, I>(notes: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<TaggingState>)>,
    {
        let mut completeness = DataCompleteness::default();

        for (note_id, state) in notes {
            completeness.total_notes += 1;
            match state {
                Some(TaggingState::Tagged) => completeness.tagged_notes += 1,
                Some(TaggingState::Failed) => {
                    completeness.failed_note_ids.push(note_id.to_string())
                }
                Some(TaggingState::Pending) | None => {
                    completeness.pending_note_ids.push(note_id.to_string())
                }
            }
        }

        completeness.is_complete = completeness.tagged_notes == completeness.total_notes;
        completeness
    }
}
