use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::DatabaseConfig;
use crate::db::{Database, DatabaseBackend, LibSqlBackend};
use crate::error::Result;
use crate::intelligence::{ExtractedInsight, ExtractedTags, ExtractionCapability};

/// Backend over a fresh temporary database file.
pub async fn setup() -> (Arc<dyn DatabaseBackend>, Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig::local(format!("file:{}", dir.path().join("test.db").display()));
    let db = Database::new(&config).await.unwrap();
    (Arc::new(LibSqlBackend::new(db.clone())), db, dir)
}

pub async fn seed_note(db: &Database, id: &str, client_id: &str, date: &str, content: &str) {
    db.connect()
        .unwrap()
        .execute(
            "INSERT INTO progress_notes (id, client_id, therapist_id, session_date, content, status, created_at)
             VALUES (?1, ?2, 't1', ?3, ?4, 'signed', '2024-01-01T00:00:00.000000Z')",
            libsql::params![id, client_id, date, content],
        )
        .await
        .unwrap();
}

/// Returns the same themes for every note and no insights.
#[derive(Default)]
pub struct StaticCapability;

#[async_trait]
impl ExtractionCapability for StaticCapability {
    async fn extract_tags(&self, _text: &str) -> Result<ExtractedTags> {
        ExtractedTags::from_value(&serde_json::json!({ "themes": ["family"] }))
    }

    async fn extract_insights(&self, _text: &str) -> Result<Vec<ExtractedInsight>> {
        Ok(Vec::new())
    }
}
