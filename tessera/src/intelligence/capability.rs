use async_trait::async_trait;

use crate::error::Result;

use super::types::{ExtractedInsight, ExtractedTags};

/// Text-in, structured-out extraction over a single note.
///
/// Implementations return already-validated values. Timeouts, transport errors
/// and malformed responses surface as `TesseraError::ExtractionUnavailable`
/// (or another extraction-side error); an empty result always means the text
/// genuinely had nothing to extract. Retry policy belongs to the caller.
#[async_trait]
pub trait ExtractionCapability: Send + Sync {
    async fn extract_tags(&self, text: &str) -> Result<ExtractedTags>;
    async fn extract_insights(&self, text: &str) -> Result<Vec<ExtractedInsight>>;
}
