use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::models::{now_timestamp, ProgressNote};

use super::tagger::TaggingQueue;

/// Poll-based note creation feed for the tagging queue.
#[derive(Clone)]
pub struct NoteWatcher {
    db: Arc<dyn DatabaseBackend>,
    queue: TaggingQueue,
    batch_size: usize,
    interval_secs: u64,
    retry_failed_after_secs: Option<u64>,
    /// Notes submitted by this watcher whose job has not finished yet.
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl NoteWatcher {
    pub fn new(
        db: Arc<dyn DatabaseBackend>,
        queue: TaggingQueue,
        config: &WatcherConfig,
        retry_failed_after_secs: Option<u64>,
    ) -> Self {
        Self {
            db,
            queue,
            batch_size: config.batch_size.max(1),
            interval_secs: config.poll_interval_secs,
            retry_failed_after_secs,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run a single pass: drop data of deleted notes, queue notes that were
    /// never picked up, and re-queue old failures when retrying is enabled.
    ///
    /// Returns the number of notes queued.
    pub async fn run_once(&self) -> Result<u64> {
        match self.db.purge_removed_notes().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Purged derived data of removed notes"),
            Err(e) => warn!(error = %e, "Failed to purge removed notes"),
        }

        let untagged = self.db.list_untagged_notes(self.batch_size).await?;
        let mut queued = self.enqueue(untagged).await;

        if let Some(delay) = self.retry_failed_after_secs {
            match retry_cutoff(delay) {
                Some(before) => {
                    let failed = self.db.list_failed_notes(before, self.batch_size).await?;
                    if !failed.is_empty() {
                        debug!(count = failed.len(), "Re-queueing failed notes");
                    }
                    queued += self.enqueue(failed).await;
                }
                None => warn!(delay, "Failed-note retry delay out of range, skipping retry"),
            }
        }

        if queued > 0 {
            info!(queued, "Notes queued for tagging");
        }

        Ok(queued)
    }

    /// Submit notes that are not already waiting in the queue. Stops at the
    /// first refusal: the queue is full or shut down.
    async fn enqueue(&self, notes: Vec<ProgressNote>) -> u64 {
        let mut queued = 0u64;

        for note in notes {
            let note_id = note.id.clone();
            if self.in_flight.lock().await.contains(&note_id) {
                continue;
            }

            let handle = self.queue.submit(note);
            if !handle.is_queued() {
                break;
            }
            queued += 1;
            self.in_flight.lock().await.insert(note_id.clone());

            let in_flight = self.in_flight.clone();
            tokio::spawn(async move {
                let outcome = handle.wait().await;
                debug!(note_id = %note_id, ?outcome, "Tagging job finished");
                in_flight.lock().await.remove(&note_id);
            });
        }

        queued
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }
}

/// Failures last updated before this instant are due for a retry.
fn retry_cutoff(delay_secs: u64) -> Option<DateTime<Utc>> {
    let delay = i64::try_from(delay_secs).ok().and_then(Duration::try_seconds)?;
    now_timestamp().checked_sub_signed(delay)
}
