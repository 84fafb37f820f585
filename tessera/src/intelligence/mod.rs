pub mod capability;
pub mod extractor;
pub mod recommendations;
pub mod types;
pub mod utils;

pub use capability::ExtractionCapability;
pub use extractor::LlmExtractionCapability;
pub use recommendations::{evaluate_rules, JourneyAggregate, Recommendation};
pub use types::{ExtractedCategory, ExtractedInsight, ExtractedTags};
