mod engine;
mod linker;
mod note_watcher;
mod recall;
mod synthesis_refresh;
mod synthesizer;
pub mod tagger;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::InsightEngine;
pub use linker::CrossReferenceLinker;
pub use note_watcher::NoteWatcher;
pub use recall::QuickRecall;
pub use synthesis_refresh::SynthesisRefreshManager;
pub use synthesizer::JourneySynthesizer;
pub use tagger::{AutoTagger, TaggingHandle, TaggingOutcome, TaggingQueue};
