use std::sync::Arc;

use nanoid::nanoid;
use tracing::debug;

use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::intelligence::utils::{linkable_values, shared_values, LinkableValues};
use crate::models::{now_timestamp, ordered_pair, CrossReference, LinkRelation, SessionTag};

/// Records recurring-theme links between a note and the client's other notes.
#[derive(Clone)]
pub struct CrossReferenceLinker {
    db: Arc<dyn DatabaseBackend>,
}

impl CrossReferenceLinker {
    pub fn new(db: Arc<dyn DatabaseBackend>) -> Self {
        Self { db }
    }

    /// Link `note_id` to every other note of the client that shares at least
    /// one emotion, theme or coping value in the same category.
    ///
    /// Idempotent: links are upserted per sorted pair, and links of this note
    /// whose overlap disappeared after a re-tag are removed. Returns the number
    /// of partner notes the note is linked to afterwards.
    pub async fn link_note(&self, client_id: &str, note_id: &str) -> Result<usize> {
        let client_tags = self.db.get_client_tags(client_id, None).await?;

        let own = linkable_values(client_tags.iter().filter(|t| t.note_id == note_id));
        if own.values().all(|values| values.is_empty()) {
            let pruned = self.db.prune_note_cross_references(note_id, &[]).await?;
            debug!(client_id, note_id, pruned, "Note has no linkable tags");
            return Ok(0);
        }

        let mut partners: Vec<String> = Vec::new();
        let mut written = 0usize;
        let created_at = now_timestamp();

        for (other_id, other) in group_by_note(&client_tags, note_id) {
            let shared = shared_values(&own, &other);
            if shared.is_empty() {
                continue;
            }

            let (source, target) = ordered_pair(note_id, &other_id);
            let link = CrossReference {
                id: nanoid!(),
                client_id: client_id.to_string(),
                source_note_id: source.to_string(),
                target_note_id: target.to_string(),
                relation: LinkRelation::RecurringTheme,
                strength: shared.len() as u32,
                shared_values: shared,
                created_at,
            };

            if self.db.upsert_cross_reference(&link).await? {
                written += 1;
            }
            partners.push(other_id);
        }

        let pruned = self
            .db
            .prune_note_cross_references(note_id, &partners)
            .await?;

        debug!(
            client_id,
            note_id,
            partners = partners.len(),
            written,
            pruned,
            "Cross references updated"
        );

        Ok(partners.len())
    }
}

/// Linkable values per other note, in first-seen order.
fn group_by_note(tags: &[SessionTag], exclude: &str) -> Vec<(String, LinkableValues)> {
    let mut order: Vec<String> = Vec::new();
    for tag in tags {
        if tag.note_id != exclude && !order.contains(&tag.note_id) {
            order.push(tag.note_id.clone());
        }
    }

    order
        .into_iter()
        .map(|id| {
            let values = linkable_values(tags.iter().filter(|t| t.note_id == id));
            (id, values)
        })
        .collect()
}
