use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TaggingConfig;
use crate::db::DatabaseBackend;
use crate::error::{Result, TesseraError};
use crate::intelligence::{ExtractedInsight, ExtractedTags, ExtractionCapability};
use crate::models::{
    now_timestamp, ProgressNote, SessionInsight, SessionTag, TaggingState, TaggingStatus,
};

use super::linker::CrossReferenceLinker;

/// How a single tagging job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggingOutcome {
    Tagged {
        tags_written: usize,
        insights_written: usize,
        links: usize,
    },
    /// Tags were committed but insight extraction gave up. The note is
    /// flagged `tagging_failed`.
    Partial {
        tags_written: usize,
        links: usize,
        error: String,
    },
    Failed {
        attempts: u32,
        error: String,
    },
    /// The note was deleted before anything was written.
    SourceRemoved,
    /// The queue was full or shut down.
    NotQueued,
}

impl TaggingOutcome {
    pub fn is_tagged(&self) -> bool {
        matches!(self, Self::Tagged { .. })
    }
}

/// Runs extraction for one note and writes its tags, insights and links.
#[derive(Clone)]
pub struct AutoTagger {
    db: Arc<dyn DatabaseBackend>,
    extractor: Arc<dyn ExtractionCapability>,
    linker: CrossReferenceLinker,
    config: TaggingConfig,
}

impl AutoTagger {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        extractor: Arc<dyn ExtractionCapability>,
        config: TaggingConfig,
    ) -> Self {
        Self {
            linker: CrossReferenceLinker::new(db.clone()),
            db,
            extractor,
            config,
        }
    }

    /// Tag one note. Never returns an error: every failure is logged and
    /// recorded on the note's tagging status.
    pub async fn tag_note(&self, note: &ProgressNote) -> TaggingOutcome {
        let note_id = note.id.as_str();
        let client_id = note.client_id.as_str();

        let current = match self.db.get_note(note_id).await {
            Ok(Some(current)) => current,
            Ok(None) => return self.source_removed(note_id).await,
            Err(e) => {
                error!(note_id, client_id, error = %e, "Failed to read note for tagging");
                return TaggingOutcome::Failed {
                    attempts: 0,
                    error: e.to_string(),
                };
            }
        };

        self.record_status(&current, TaggingState::Pending, 0, None)
            .await;

        if current.content.trim().is_empty() {
            debug!(note_id, "Note has no content, nothing to extract");
            self.record_status(&current, TaggingState::Tagged, 0, None)
                .await;
            return TaggingOutcome::Tagged {
                tags_written: 0,
                insights_written: 0,
                links: 0,
            };
        }

        let content = current.content.as_str();
        let extractor = &self.extractor;

        let (tags, tag_attempts) = match self
            .with_retry("tag", note_id, || extractor.extract_tags(content))
            .await
        {
            Ok(result) => result,
            Err((attempts, e)) => return self.fail(&current, attempts, e).await,
        };
        let extracted_at = now_timestamp();

        match self.note_still_exists(note_id).await {
            Ok(true) => {}
            Ok(false) => return self.source_removed(note_id).await,
            Err(e) => return self.fail(&current, tag_attempts, e).await,
        }

        let tags_written = match self.write_tags(&current, &tags, extracted_at).await {
            Ok(count) => count,
            Err(e) => return self.fail(&current, tag_attempts, e).await,
        };

        let insight_result = self
            .with_retry("insight", note_id, || extractor.extract_insights(content))
            .await;

        let (insights_written, attempts, insight_error) = match insight_result {
            Ok((insights, attempts)) => match self.write_insights(&current, &insights).await {
                Ok(count) => (count, tag_attempts + attempts, None),
                Err(e) => (0, tag_attempts + attempts, Some(e)),
            },
            Err((attempts, e)) => (0, tag_attempts + attempts, Some(e)),
        };

        let links = match self.linker.link_note(client_id, note_id).await {
            Ok(links) => links,
            Err(e) => {
                warn!(note_id, client_id, error = %e, "Cross-reference linking failed");
                0
            }
        };

        if let Some(e) = insight_error {
            warn!(note_id, client_id, attempts, error = %e, "Insight extraction failed after tags were written");
            self.record_status(&current, TaggingState::Failed, attempts, Some(e.to_string()))
                .await;
            return TaggingOutcome::Partial {
                tags_written,
                links,
                error: e.to_string(),
            };
        }

        self.record_status(&current, TaggingState::Tagged, attempts, None)
            .await;

        info!(
            note_id,
            client_id, tags_written, insights_written, links, "Note tagged"
        );

        TaggingOutcome::Tagged {
            tags_written,
            insights_written,
            links,
        }
    }

    /// Call `op` until it succeeds or the retry budget is spent. Each call is
    /// bounded by the per-call timeout; a timeout counts as a failed attempt.
    async fn with_retry<T, F, Fut>(
        &self,
        what: &'static str,
        note_id: &str,
        mut op: F,
    ) -> std::result::Result<(T, u32), (u32, TesseraError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let call_timeout = Duration::from_secs(self.config.call_timeout_secs);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(TesseraError::ExtractionUnavailable(format!(
                    "{what} extraction timed out after {}s",
                    self.config.call_timeout_secs
                ))),
            };

            match result {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if e.is_extraction_failure() && attempt <= self.config.max_retries => {
                    let delay = backoff_delay(&self.config, attempt);
                    warn!(
                        note_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "{what} extraction failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((attempt, e)),
            }
        }
    }

    async fn write_tags(
        &self,
        note: &ProgressNote,
        tags: &ExtractedTags,
        extracted_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<usize> {
        let mut written = 0;
        for extracted in &tags.categories {
            let tag = SessionTag {
                id: nanoid!(),
                note_id: note.id.clone(),
                client_id: note.client_id.clone(),
                category: extracted.category,
                values: extracted.values.clone(),
                confidence: extracted.confidence,
                created_at: extracted_at,
            };
            if self.db.upsert_tag(&tag).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn write_insights(
        &self,
        note: &ProgressNote,
        insights: &[ExtractedInsight],
    ) -> Result<usize> {
        let created_at = now_timestamp();
        let mut written = 0;
        for extracted in insights {
            let insight = SessionInsight {
                id: nanoid!(),
                note_id: note.id.clone(),
                client_id: note.client_id.clone(),
                insight_type: extracted.insight_type,
                text: extracted.text.clone(),
                created_at,
            };
            if self.db.insert_insight(&insight).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn note_still_exists(&self, note_id: &str) -> Result<bool> {
        Ok(self.db.get_note(note_id).await?.is_some())
    }

    async fn source_removed(&self, note_id: &str) -> TaggingOutcome {
        info!(note_id, "Note removed before tagging finished, discarding");
        if let Err(e) = self.db.delete_note_data(note_id).await {
            warn!(note_id, error = %e, "Failed to clear data of removed note");
        }
        TaggingOutcome::SourceRemoved
    }

    async fn fail(&self, note: &ProgressNote, attempts: u32, e: TesseraError) -> TaggingOutcome {
        error!(
            note_id = %note.id,
            client_id = %note.client_id,
            attempts,
            error = %e,
            "Tagging failed"
        );
        self.record_status(note, TaggingState::Failed, attempts, Some(e.to_string()))
            .await;
        TaggingOutcome::Failed {
            attempts,
            error: e.to_string(),
        }
    }

    async fn record_status(
        &self,
        note: &ProgressNote,
        state: TaggingState,
        attempts: u32,
        last_error: Option<String>,
    ) {
        let status = TaggingStatus {
            note_id: note.id.clone(),
            client_id: note.client_id.clone(),
            state,
            attempts,
            last_error,
            updated_at: now_timestamp(),
        };
        if let Err(e) = self.db.set_tagging_status(&status).await {
            warn!(note_id = %note.id, state = %state, error = %e, "Failed to record tagging status");
        }
    }
}

/// `base * 2^(attempt-1)`, capped at `max_backoff_ms`.
fn backoff_delay(config: &TaggingConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay = config
        .base_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_backoff_ms);
    Duration::from_millis(delay)
}

struct TaggingJob {
    note: ProgressNote,
    done: oneshot::Sender<TaggingOutcome>,
}

/// Completion signal for a submitted note.
pub struct TaggingHandle {
    note_id: String,
    done: Option<oneshot::Receiver<TaggingOutcome>>,
}

impl TaggingHandle {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    /// `false` when the queue refused the job.
    pub fn is_queued(&self) -> bool {
        self.done.is_some()
    }

    /// Wait for the job to finish. Resolves to `NotQueued` if the job was
    /// never accepted or the queue shut down before running it.
    pub async fn wait(self) -> TaggingOutcome {
        match self.done {
            Some(rx) => rx.await.unwrap_or(TaggingOutcome::NotQueued),
            None => TaggingOutcome::NotQueued,
        }
    }
}

/// Bounded background queue in front of [`AutoTagger`].
#[derive(Clone)]
pub struct TaggingQueue {
    tx: mpsc::Sender<TaggingJob>,
}

impl TaggingQueue {
    /// Spawn the dispatcher. It stops when `cancel` fires or every queue
    /// handle is dropped; jobs already running are allowed to finish.
    pub fn start(tagger: AutoTagger, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let capacity = tagger.config.queue_capacity.max(1);
        let max_concurrent = tagger.config.max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let dispatcher = tokio::spawn(dispatch(
            rx,
            tagger,
            Arc::new(Semaphore::new(max_concurrent)),
            cancel,
        ));

        (Self { tx }, dispatcher)
    }

    /// Queue a note for tagging without waiting.
    pub fn submit(&self, note: ProgressNote) -> TaggingHandle {
        let note_id = note.id.clone();
        let (done_tx, done_rx) = oneshot::channel();

        match self.tx.try_send(TaggingJob {
            note,
            done: done_tx,
        }) {
            Ok(()) => {
                debug!(note_id = %note_id, "Note queued for tagging");
                TaggingHandle {
                    note_id,
                    done: Some(done_rx),
                }
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(note_id = %note_id, "Tagging queue full, note left for the watcher");
                TaggingHandle { note_id, done: None }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(note_id = %note_id, "Tagging queue closed, note left for the watcher");
                TaggingHandle { note_id, done: None }
            }
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<TaggingJob>,
    tagger: AutoTagger,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let tagger = tagger.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let outcome = tagger.tag_note(&job.note).await;
            // The submitter may have dropped its handle
            let _ = job.done.send(outcome);
        });
    }

    debug!("Tagging dispatcher stopped");
}
