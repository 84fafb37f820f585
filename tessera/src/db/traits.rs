use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    CrossReference, DateRange, JourneySynthesis, ProgressNote, SessionInsight, SessionTag,
    TagCategory, TaggingStatus,
};

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

/// Per-note, per-category tag records.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Atomic replace-by-category.
    ///
    /// Returns `false` when the stored record was kept: either it carries the
    /// same values already, or it came from a later extraction than `tag`.
    async fn upsert_tag(&self, tag: &SessionTag) -> Result<bool>;
    async fn get_note_tags(&self, note_id: &str) -> Result<Vec<SessionTag>>;
    /// Tags for one client in insertion order.
    async fn get_client_tags(
        &self,
        client_id: &str,
        category: Option<TagCategory>,
    ) -> Result<Vec<SessionTag>>;
}

/// Additive insight records.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Returns `false` if the note already has an insight with this exact text.
    async fn insert_insight(&self, insight: &SessionInsight) -> Result<bool>;
    async fn get_note_insights(&self, note_id: &str) -> Result<Vec<SessionInsight>>;
    /// Insights for one client in insertion order.
    async fn get_client_insights(&self, client_id: &str) -> Result<Vec<SessionInsight>>;
}

/// Undirected note-to-note relations.
#[async_trait]
pub trait CrossReferenceStore: Send + Sync {
    /// Upsert keyed by sorted endpoint pair and relation. Returns `false` when
    /// an identical row already existed.
    async fn upsert_cross_reference(&self, link: &CrossReference) -> Result<bool>;
    async fn get_client_cross_references(&self, client_id: &str) -> Result<Vec<CrossReference>>;
    /// Links touching `note_id` from either endpoint.
    async fn get_note_cross_references(&self, note_id: &str) -> Result<Vec<CrossReference>>;
    /// Remove links of `note_id` whose other endpoint is not in `keep`.
    async fn prune_note_cross_references(&self, note_id: &str, keep: &[String]) -> Result<u64>;
}

/// Cache of generated journey syntheses.
#[async_trait]
pub trait SynthesisStore: Send + Sync {
    async fn get_cached_synthesis(
        &self,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<JourneySynthesis>>;
    async fn upsert_cached_synthesis(&self, synthesis: &JourneySynthesis) -> Result<()>;
    async fn list_cached_synthesis_keys(&self) -> Result<Vec<(String, DateRange)>>;

    /// `MAX(created_at)` over the client's tags and insights whose note falls
    /// in `range`.
    async fn latest_source_version(
        &self,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<DateTime<Utc>>>;
}

/// Tagging lifecycle per note.
#[async_trait]
pub trait TaggingStatusStore: Send + Sync {
    async fn set_tagging_status(&self, status: &TaggingStatus) -> Result<()>;
    async fn get_tagging_status(&self, note_id: &str) -> Result<Option<TaggingStatus>>;
    async fn get_client_tagging_statuses(&self, client_id: &str) -> Result<Vec<TaggingStatus>>;
    async fn latest_status_change(&self, client_id: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Read access to the note-storage collaborator.
#[async_trait]
pub trait NoteSource: Send + Sync {
    async fn get_note(&self, note_id: &str) -> Result<Option<ProgressNote>>;
    /// Notes ascending by session date, then insertion order.
    async fn get_client_notes(
        &self,
        client_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<ProgressNote>>;
    /// Notes that have never been picked up for tagging.
    async fn list_untagged_notes(&self, limit: usize) -> Result<Vec<ProgressNote>>;
    /// Notes whose tagging failed before `before`.
    async fn list_failed_notes(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProgressNote>>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A complete backend combining all store traits with lifecycle and cascade
/// operations.
#[async_trait]
pub trait DatabaseBackend:
    TagStore + InsightStore + CrossReferenceStore + SynthesisStore + TaggingStatusStore + NoteSource
{
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;

    /// Drop every derived record of a deleted note. Returns rows removed.
    async fn delete_note_data(&self, note_id: &str) -> Result<u64>;

    /// Drop derived records of every note that no longer exists at the source.
    async fn purge_removed_notes(&self) -> Result<u64>;
}
