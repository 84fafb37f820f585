use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::intelligence::ExtractionCapability;
use crate::models::{JourneySynthesis, ProgressNote, RecallResult, SessionInsight, SessionTag, TagCategory};

use super::recall::QuickRecall;
use super::synthesizer::JourneySynthesizer;
use super::tagger::{AutoTagger, TaggingHandle, TaggingQueue};

/// Caller-facing surface of the engine: fire-and-forget tagging plus the
/// synchronous synthesis, recall and direct reads.
#[derive(Clone)]
pub struct InsightEngine {
    db: Arc<dyn DatabaseBackend>,
    queue: TaggingQueue,
    synthesizer: JourneySynthesizer,
    recall: QuickRecall,
}

impl InsightEngine {
    /// Build the services and start the tagging dispatcher. The dispatcher
    /// stops when `cancel` fires.
    pub fn start(
        db: Arc<dyn DatabaseBackend>,
        extractor: Arc<dyn ExtractionCapability>,
        config: &Config,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let tagger = AutoTagger::new(db.clone(), extractor, config.tagging.clone());
        let (queue, dispatcher) = TaggingQueue::start(tagger, cancel);

        let engine = Self {
            synthesizer: JourneySynthesizer::new(db.clone(), config.synthesis.rules.clone()),
            recall: QuickRecall::new(db.clone(), config.recall.clone()),
            queue,
            db,
        };

        (engine, dispatcher)
    }

    /// Queue a note for tagging. Never blocks and never fails; the handle
    /// reports how the job ended.
    pub fn tag_note(&self, note: ProgressNote) -> TaggingHandle {
        self.queue.submit(note)
    }

    pub async fn synthesize(
        &self,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        force_regenerate: bool,
    ) -> Result<JourneySynthesis> {
        self.synthesizer
            .synthesize(client_id, start, end, force_regenerate)
            .await
    }

    pub async fn recall(&self, client_id: &str, query: &str) -> Result<RecallResult> {
        self.recall.recall(client_id, query).await
    }

    /// Tags of the client's existing notes, optionally one category.
    pub async fn get_tags(
        &self,
        client_id: &str,
        category: Option<TagCategory>,
    ) -> Result<Vec<SessionTag>> {
        let live = self.live_notes(client_id).await?;
        Ok(self
            .db
            .get_client_tags(client_id, category)
            .await?
            .into_iter()
            .filter(|t| live.contains(&t.note_id))
            .collect())
    }

    pub async fn get_insights(&self, client_id: &str) -> Result<Vec<SessionInsight>> {
        let live = self.live_notes(client_id).await?;
        Ok(self
            .db
            .get_client_insights(client_id)
            .await?
            .into_iter()
            .filter(|i| live.contains(&i.note_id))
            .collect())
    }

    pub fn queue(&self) -> &TaggingQueue {
        &self.queue
    }

    pub fn synthesizer(&self) -> &JourneySynthesizer {
        &self.synthesizer
    }

    async fn live_notes(&self, client_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .db
            .get_client_notes(client_id, None)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect())
    }
}
