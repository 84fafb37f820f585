use async_trait::async_trait;

use crate::error::{Result, TesseraError};
use crate::llm::{prompts, CompletionOptions, LlmProvider};

use super::capability::ExtractionCapability;
use super::types::{ExtractedInsight, ExtractedTags};

/// Extraction backed by an OpenAI-compatible chat model.
#[derive(Clone)]
pub struct LlmExtractionCapability {
    llm: LlmProvider,
    options: CompletionOptions,
}

impl LlmExtractionCapability {
    pub fn new(llm: LlmProvider) -> Self {
        Self {
            llm,
            options: CompletionOptions {
                temperature: Some(0.0),
                max_tokens: None,
            },
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_available()
    }

    async fn complete(&self, prompt: &str) -> Result<serde_json::Value> {
        self.llm
            .complete_json(
                prompt,
                Some(prompts::EXTRACTION_SYSTEM_PROMPT),
                Some(&self.options),
            )
            .await
            .map_err(into_extraction_error)
    }
}

#[async_trait]
impl ExtractionCapability for LlmExtractionCapability {
    async fn extract_tags(&self, text: &str) -> Result<ExtractedTags> {
        let prompt = prompts::tag_extraction_prompt(text);
        let value = self.complete(&prompt).await?;
        let tags = ExtractedTags::from_value(&value)?;

        tracing::debug!(categories = tags.categories.len(), "Tags extracted");
        Ok(tags)
    }

    async fn extract_insights(&self, text: &str) -> Result<Vec<ExtractedInsight>> {
        let prompt = prompts::insight_extraction_prompt(text);
        let value = self.complete(&prompt).await?;
        let insights = ExtractedInsight::list_from_value(value)?;

        tracing::debug!(count = insights.len(), "Insights extracted");
        Ok(insights)
    }
}

/// Anything that went wrong talking to the model is an extraction failure
/// from the tagger's point of view, except caller-side validation.
fn into_extraction_error(error: TesseraError) -> TesseraError {
    match error {
        TesseraError::Validation(_) | TesseraError::ExtractionUnavailable(_) => error,
        other => TesseraError::ExtractionUnavailable(other.to_string()),
    }
}
