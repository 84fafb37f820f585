use crate::db::connection::Database;
use crate::db::repository::{
    CrossReferenceRepository, InsightRepository, NoteRepository, SynthesisRepository,
    TagRepository, TaggingStatusRepository,
};
use crate::db::traits::{
    CrossReferenceStore, DatabaseBackend, InsightStore, NoteSource, SynthesisStore, TagStore,
    TaggingStatusStore,
};
use crate::error::Result;
use crate::models::{
    CrossReference, DateRange, JourneySynthesis, ProgressNote, SessionInsight, SessionTag,
    TagCategory, TaggingStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TagStore for LibSqlBackend {
    async fn upsert_tag(&self, tag: &SessionTag) -> Result<bool> {
        let conn = self.db.connect()?;
        TagRepository::upsert(&conn, tag).await
    }
    async fn get_note_tags(&self, note_id: &str) -> Result<Vec<SessionTag>> {
        let conn = self.db.connect()?;
        TagRepository::get_by_note(&conn, note_id).await
    }
    async fn get_client_tags(
        &self,
        client_id: &str,
        category: Option<TagCategory>,
    ) -> Result<Vec<SessionTag>> {
        let conn = self.db.connect()?;
        TagRepository::get_by_client(&conn, client_id, category).await
    }
}

#[async_trait]
impl InsightStore for LibSqlBackend {
    async fn insert_insight(&self, insight: &SessionInsight) -> Result<bool> {
        let conn = self.db.connect()?;
        InsightRepository::insert_if_new(&conn, insight).await
    }
    async fn get_note_insights(&self, note_id: &str) -> Result<Vec<SessionInsight>> {
        let conn = self.db.connect()?;
        InsightRepository::get_by_note(&conn, note_id).await
    }
    async fn get_client_insights(&self, client_id: &str) -> Result<Vec<SessionInsight>> {
        let conn = self.db.connect()?;
        InsightRepository::get_by_client(&conn, client_id).await
    }
}

#[async_trait]
impl CrossReferenceStore for LibSqlBackend {
    async fn upsert_cross_reference(&self, link: &CrossReference) -> Result<bool> {
        let conn = self.db.connect()?;
        CrossReferenceRepository::upsert(&conn, link).await
    }
    async fn get_client_cross_references(&self, client_id: &str) -> Result<Vec<CrossReference>> {
        let conn = self.db.connect()?;
        CrossReferenceRepository::get_by_client(&conn, client_id).await
    }
    async fn get_note_cross_references(&self, note_id: &str) -> Result<Vec<CrossReference>> {
        let conn = self.db.connect()?;
        CrossReferenceRepository::get_by_note(&conn, note_id).await
    }
    async fn prune_note_cross_references(&self, note_id: &str, keep: &[String]) -> Result<u64> {
        let conn = self.db.connect()?;
        CrossReferenceRepository::prune_for_note(&conn, note_id, keep).await
    }
}

#[async_trait]
impl SynthesisStore for LibSqlBackend {
    async fn get_cached_synthesis(
        &self,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<JourneySynthesis>> {
        let conn = self.db.connect()?;
        SynthesisRepository::get(&conn, client_id, range).await
    }
    async fn upsert_cached_synthesis(&self, synthesis: &JourneySynthesis) -> Result<()> {
        let conn = self.db.connect()?;
        SynthesisRepository::upsert(&conn, synthesis).await
    }
    async fn list_cached_synthesis_keys(&self) -> Result<Vec<(String, DateRange)>> {
        let conn = self.db.connect()?;
        SynthesisRepository::list_keys(&conn).await
    }
    async fn latest_source_version(
        &self,
        client_id: &str,
        range: &DateRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.connect()?;
        SynthesisRepository::latest_source_version(&conn, client_id, range).await
    }
}

#[async_trait]
impl TaggingStatusStore for LibSqlBackend {
    async fn set_tagging_status(&self, status: &TaggingStatus) -> Result<()> {
        let conn = self.db.connect()?;
        TaggingStatusRepository::upsert(&conn, status).await
    }
    async fn get_tagging_status(&self, note_id: &str) -> Result<Option<TaggingStatus>> {
        let conn = self.db.connect()?;
        TaggingStatusRepository::get(&conn, note_id).await
    }
    async fn get_client_tagging_statuses(&self, client_id: &str) -> Result<Vec<TaggingStatus>> {
        let conn = self.db.connect()?;
        TaggingStatusRepository::get_by_client(&conn, client_id).await
    }
    async fn latest_status_change(&self, client_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.db.connect()?;
        TaggingStatusRepository::latest_change(&conn, client_id).await
    }
}

#[async_trait]
impl NoteSource for LibSqlBackend {
    async fn get_note(&self, note_id: &str) -> Result<Option<ProgressNote>> {
        let conn = self.db.connect()?;
        NoteRepository::get_by_id(&conn, note_id).await
    }
    async fn get_client_notes(
        &self,
        client_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<ProgressNote>> {
        let conn = self.db.connect()?;
        NoteRepository::get_by_client(&conn, client_id, range).await
    }
    async fn list_untagged_notes(&self, limit: usize) -> Result<Vec<ProgressNote>> {
        let conn = self.db.connect()?;
        NoteRepository::list_untagged(&conn, limit).await
    }
    async fn list_failed_notes(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ProgressNote>> {
        let conn = self.db.connect()?;
        NoteRepository::list_failed(&conn, before, limit).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }

    async fn delete_note_data(&self, note_id: &str) -> Result<u64> {
        let conn = self.db.connect()?;
        let tx = conn.transaction().await?;

        let mut removed = 0;
        removed += tx
            .execute("DELETE FROM session_tags WHERE note_id = ?1", params![note_id])
            .await?;
        removed += tx
            .execute("DELETE FROM session_insights WHERE note_id = ?1", params![note_id])
            .await?;
        removed += tx
            .execute(
                "DELETE FROM cross_references WHERE source_note_id = ?1 OR target_note_id = ?1",
                params![note_id],
            )
            .await?;
        removed += tx
            .execute(
                "DELETE FROM note_tagging_status WHERE note_id = ?1",
                params![note_id],
            )
            .await?;

        tx.commit().await?;

        if removed > 0 {
            tracing::info!(note_id, rows = removed, "Removed derived data for deleted note");
        }
        Ok(removed)
    }

    async fn purge_removed_notes(&self) -> Result<u64> {
        let conn = self.db.connect()?;
        let tx = conn.transaction().await?;

        let mut removed = 0;
        removed += tx
            .execute(
                "DELETE FROM session_tags WHERE note_id NOT IN (SELECT id FROM progress_notes)",
                (),
            )
            .await?;
        removed += tx
            .execute(
                "DELETE FROM session_insights WHERE note_id NOT IN (SELECT id FROM progress_notes)",
                (),
            )
            .await?;
        removed += tx
            .execute(
                "DELETE FROM cross_references
                 WHERE source_note_id NOT IN (SELECT id FROM progress_notes)
                    OR target_note_id NOT IN (SELECT id FROM progress_notes)",
                (),
            )
            .await?;
        removed += tx
            .execute(
                "DELETE FROM note_tagging_status WHERE note_id NOT IN (SELECT id FROM progress_notes)",
                (),
            )
            .await?;

        tx.commit().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::{now_timestamp, InsightType, LinkRelation, TaggingState};
    use tempfile::TempDir;

    async fn setup_test_db() -> (LibSqlBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tessera_test.db");
        let config = DatabaseConfig::local(format!("file:{}", path.display()));
        let db = Database::new(&config)
            .await
            .expect("Failed to create database");

        (LibSqlBackend::new(db), dir)
    }

    async fn insert_note(backend: &LibSqlBackend, id: &str, session_date: &str) {
        let conn = backend.db.connect().unwrap();
        conn.execute(
            "INSERT INTO progress_notes (id, client_id, therapist_id, session_date, content, status, created_at)
             VALUES (?1, 'client1', 't1', ?2, 'body', 'signed', '2024-01-01T00:00:00.000000Z')",
            params![id, session_date],
        )
        .await
        .unwrap();
    }

    async fn seed_derived(backend: &LibSqlBackend, note_id: &str, partner: &str) {
        backend
            .upsert_tag(&SessionTag {
                id: format!("tag_{note_id}"),
                note_id: note_id.to_string(),
                client_id: "client1".to_string(),
                category: TagCategory::Themes,
                values: vec!["family".to_string()],
                confidence: 0.9,
                created_at: now_timestamp(),
            })
            .await
            .unwrap();
        backend
            .insert_insight(&SessionInsight {
                id: format!("ins_{note_id}"),
                note_id: note_id.to_string(),
                client_id: "client1".to_string(),
                insight_type: InsightType::Pattern,
                text: "Avoids conflict at home".to_string(),
                created_at: now_timestamp(),
            })
            .await
            .unwrap();
        let (source, target) = crate::models::ordered_pair(note_id, partner);
        backend
            .upsert_cross_reference(&CrossReference {
                id: format!("link_{note_id}"),
                client_id: "client1".to_string(),
                source_note_id: source.to_string(),
                target_note_id: target.to_string(),
                relation: LinkRelation::RecurringTheme,
                strength: 1,
                shared_values: vec!["family".to_string()],
                created_at: now_timestamp(),
            })
            .await
            .unwrap();
        backend
            .set_tagging_status(&TaggingStatus {
                note_id: note_id.to_string(),
                client_id: "client1".to_string(),
                state: TaggingState::Tagged,
                attempts: 1,
                last_error: None,
                updated_at: now_timestamp(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_note_data_cascades() {
        let (backend, _dir) = setup_test_db().await;
        insert_note(&backend, "n1", "2024-01-01").await;
        insert_note(&backend, "n2", "2024-01-08").await;
        seed_derived(&backend, "n1", "n2").await;

        let removed = backend.delete_note_data("n1").await.unwrap();
        assert_eq!(removed, 4);

        assert!(backend.get_note_tags("n1").await.unwrap().is_empty());
        assert!(backend.get_note_insights("n1").await.unwrap().is_empty());
        assert!(backend.get_note_cross_references("n2").await.unwrap().is_empty());
        assert!(backend.get_tagging_status("n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_removed_notes_only_touches_orphans() {
        let (backend, _dir) = setup_test_db().await;
        insert_note(&backend, "kept", "2024-01-01").await;
        seed_derived(&backend, "kept", "zz_missing").await;
        seed_derived(&backend, "gone", "kept").await;

        let removed = backend.purge_removed_notes().await.unwrap();
        assert!(removed > 0);

        assert_eq!(backend.get_note_tags("kept").await.unwrap().len(), 1);
        assert!(backend.get_note_tags("gone").await.unwrap().is_empty());
        // Both links had a missing endpoint
        assert!(backend
            .get_client_cross_references("client1")
            .await
            .unwrap()
            .is_empty());
        assert!(backend.get_tagging_status("kept").await.unwrap().is_some());
        assert!(backend.get_tagging_status("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_untagged_notes_disappear_once_status_set() {
        let (backend, _dir) = setup_test_db().await;
        insert_note(&backend, "n1", "2024-01-01").await;

        assert_eq!(backend.list_untagged_notes(10).await.unwrap().len(), 1);

        backend
            .set_tagging_status(&TaggingStatus {
                note_id: "n1".to_string(),
                client_id: "client1".to_string(),
                state: TaggingState::Pending,
                attempts: 0,
                last_error: None,
                updated_at: now_timestamp(),
            })
            .await
            .unwrap();

        assert!(backend.list_untagged_notes(10).await.unwrap().is_empty());
    }
}
