#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tempfile::TempDir;

use tessera::config::{DatabaseConfig, TaggingConfig};
use tessera::db::{Database, DatabaseBackend, LibSqlBackend};
use tessera::error::{Result, TesseraError};
use tessera::intelligence::{ExtractedInsight, ExtractedTags, ExtractionCapability};
use tessera::models::{InsightType, ProgressNote};

/// Extraction capability answering from a script keyed by note content.
///
/// Content with no script entry extracts nothing. The first
/// `failures` tag extraction calls fail.
#[derive(Default)]
pub struct ScriptedCapability {
    tags: HashMap<String, Value>,
    insights: HashMap<String, Vec<ExtractedInsight>>,
    failures: AtomicU32,
    pub tag_calls: AtomicU32,
}

impl ScriptedCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(mut self, content: &str, response: Value) -> Self {
        self.tags.insert(content.to_string(), response);
        self
    }

    pub fn with_insights(mut self, content: &str, insights: &[(InsightType, &str)]) -> Self {
        self.insights.insert(
            content.to_string(),
            insights
                .iter()
                .map(|(insight_type, text)| ExtractedInsight {
                    insight_type: *insight_type,
                    text: text.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn failing(self, failures: u32) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn tag_calls(&self) -> u32 {
        self.tag_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionCapability for ScriptedCapability {
    async fn extract_tags(&self, text: &str) -> Result<ExtractedTags> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TesseraError::ExtractionUnavailable(
                "capability timed out".to_string(),
            ));
        }

        match self.tags.get(text) {
            Some(response) => ExtractedTags::from_value(response),
            None => Ok(ExtractedTags::default()),
        }
    }

    async fn extract_insights(&self, text: &str) -> Result<Vec<ExtractedInsight>> {
        Ok(self.insights.get(text).cloned().unwrap_or_default())
    }
}

pub async fn test_backend() -> (Arc<dyn DatabaseBackend>, Database, TempDir) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("tessera_integ_test.db");
    let config = DatabaseConfig::local(format!("file:{}", db_path.display()));

    let db = Database::new(&config)
        .await
        .expect("failed to create database");
    let backend: Arc<dyn DatabaseBackend> = Arc::new(LibSqlBackend::new(db.clone()));
    (backend, db, temp_dir)
}

/// Insert a note the way the note-storage collaborator would.
pub async fn seed_note(
    db: &Database,
    id: &str,
    client_id: &str,
    session_date: &str,
    content: &str,
) -> ProgressNote {
    db.connect()
        .expect("connect should work")
        .execute(
            "INSERT INTO progress_notes (id, client_id, therapist_id, session_date, content, status, created_at)
             VALUES (?1, ?2, 'therapist-1', ?3, ?4, 'signed', '2024-01-01T00:00:00.000000Z')",
            libsql::params![id, client_id, session_date, content],
        )
        .await
        .expect("note should be inserted");

    ProgressNote {
        id: id.to_string(),
        client_id: client_id.to_string(),
        therapist_id: "therapist-1".to_string(),
        session_id: None,
        session_date: NaiveDate::parse_from_str(session_date, "%Y-%m-%d")
            .expect("valid session date"),
        content: content.to_string(),
        status: "signed".to_string(),
    }
}

pub async fn delete_note(db: &Database, id: &str) {
    db.connect()
        .expect("connect should work")
        .execute("DELETE FROM progress_notes WHERE id = ?1", libsql::params![id])
        .await
        .expect("note should be deleted");
}

/// Retry policy that keeps tests fast.
pub fn fast_tagging() -> TaggingConfig {
    TaggingConfig {
        max_retries: 2,
        base_backoff_ms: 1,
        max_backoff_ms: 5,
        call_timeout_secs: 5,
        ..Default::default()
    }
}

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
}
