use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A clinical progress note as owned by the note-storage collaborator.
///
/// Read-only from this crate's point of view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNote {
    pub id: String,
    pub client_id: String,
    pub therapist_id: String,
    pub session_id: Option<String>,
    pub session_date: NaiveDate,
    pub content: String,
    pub status: String,
}

/// Inclusive date range over session dates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        *date >= self.start && *date <= self.end
    }
}
