mod cross_references;
mod insights;
mod notes;
mod syntheses;
mod tagging_status;
mod tags;

pub use cross_references::CrossReferenceRepository;
pub use insights::InsightRepository;
pub use notes::NoteRepository;
pub use syntheses::SynthesisRepository;
pub use tagging_status::TaggingStatusRepository;
pub use tags::TagRepository;

use chrono::{DateTime, Utc};

use crate::models::parse_timestamp;

pub(crate) fn timestamp_or_now(value: &str) -> DateTime<Utc> {
    parse_timestamp(value).unwrap_or_else(Utc::now)
}

pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 1), "?2");
        assert_eq!(placeholders(1, 0), "");
    }
}
