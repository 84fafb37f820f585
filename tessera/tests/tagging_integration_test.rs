use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use tessera::config::Config;
use tessera::models::{InsightType, TagCategory, TaggingState};
use tessera::services::{AutoTagger, InsightEngine, TaggingOutcome};

mod common;
use common::{delete_note, fast_tagging, seed_note, test_backend, ScriptedCapability};

const FAMILY_NOTE: &str = "Client discussed tension with family and feeling anxious.";

fn family_script() -> ScriptedCapability {
    ScriptedCapability::new()
        .with_tags(
            FAMILY_NOTE,
            json!({
                "emotions": ["anxiety"],
                "themes": ["family", "boundaries"],
                "copingStrategies": ["journaling"],
                "confidence": {"emotions": 0.9, "themes": 0.8, "coping_strategies": 0.6}
            }),
        )
        .with_insights(
            FAMILY_NOTE,
            &[(InsightType::Pattern, "Withdraws when family conflict escalates")],
        )
}

#[tokio::test]
async fn test_tagging_same_note_twice_is_idempotent() {
    let (backend, db, _dir) = test_backend().await;
    let note = seed_note(&db, "n1", "client-1", "2024-03-01", FAMILY_NOTE).await;
    let tagger = AutoTagger::new(backend.clone(), Arc::new(family_script()), fast_tagging());

    let first = tagger.tag_note(&note).await;
    assert_eq!(
        first,
        TaggingOutcome::Tagged {
            tags_written: 3,
            insights_written: 1,
            links: 0
        }
    );
    let tags_after_first = backend.get_note_tags("n1").await.unwrap();
    let insights_after_first = backend.get_note_insights("n1").await.unwrap();

    let second = tagger.tag_note(&note).await;
    assert_eq!(
        second,
        TaggingOutcome::Tagged {
            tags_written: 0,
            insights_written: 0,
            links: 0
        }
    );

    assert_eq!(backend.get_note_tags("n1").await.unwrap(), tags_after_first);
    assert_eq!(
        backend.get_note_insights("n1").await.unwrap(),
        insights_after_first
    );

    let themes = tags_after_first
        .iter()
        .find(|t| t.category == TagCategory::Themes)
        .expect("themes tag");
    assert_eq!(themes.values, vec!["family", "boundaries"]);
    assert_eq!(themes.confidence, 0.8);
}

#[tokio::test]
async fn test_retag_replaces_category_values() {
    let (backend, db, _dir) = test_backend().await;
    let note = seed_note(&db, "n1", "client-1", "2024-03-01", FAMILY_NOTE).await;

    let edited = "Client focused on work stress this week.";
    let script = family_script().with_tags(edited, json!({"themes": ["work stress"]}));
    let tagger = AutoTagger::new(backend.clone(), Arc::new(script), fast_tagging());

    assert!(tagger.tag_note(&note).await.is_tagged());

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    db.connect()
        .unwrap()
        .execute(
            "UPDATE progress_notes SET content = ?1 WHERE id = 'n1'",
            libsql::params![edited],
        )
        .await
        .unwrap();
    assert!(tagger.tag_note(&note).await.is_tagged());

    let themes = backend
        .get_client_tags("client-1", Some(TagCategory::Themes))
        .await
        .unwrap();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].values, vec!["work stress"]);

    // Categories the new extraction did not return are kept
    let emotions = backend
        .get_client_tags("client-1", Some(TagCategory::Emotions))
        .await
        .unwrap();
    assert_eq!(emotions[0].values, vec!["anxiety"]);

    // Insights are additive
    assert_eq!(backend.get_note_insights("n1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (backend, db, _dir) = test_backend().await;
    let note = seed_note(&db, "n1", "client-1", "2024-03-01", FAMILY_NOTE).await;
    let script = Arc::new(family_script().failing(2));
    let tagger = AutoTagger::new(backend.clone(), script.clone(), fast_tagging());

    assert!(tagger.tag_note(&note).await.is_tagged());
    assert_eq!(script.tag_calls(), 3);

    let status = backend.get_tagging_status("n1").await.unwrap().unwrap();
    assert_eq!(status.state, TaggingState::Tagged);
    // Three tag calls plus one insight call
    assert_eq!(status.attempts, 4);
}

#[tokio::test]
async fn test_exhausted_retries_flag_note_and_surface_in_synthesis() {
    let (backend, db, _dir) = test_backend().await;
    let note = seed_note(&db, "n1", "client-1", "2024-03-01", FAMILY_NOTE).await;
    let script = Arc::new(family_script().failing(10));
    let tagger = AutoTagger::new(backend.clone(), script.clone(), fast_tagging());

    let outcome = tagger.tag_note(&note).await;
    assert!(matches!(outcome, TaggingOutcome::Failed { attempts: 3, .. }));
    assert_eq!(script.tag_calls(), 3);
    assert!(backend.get_note_tags("n1").await.unwrap().is_empty());

    let status = backend.get_tagging_status("n1").await.unwrap().unwrap();
    assert_eq!(status.state, TaggingState::Failed);

    let mut config = Config::default();
    config.tagging = fast_tagging();
    let cancel = CancellationToken::new();
    let (engine, _dispatcher) =
        InsightEngine::start(backend, script, &config, cancel.clone());

    let synthesis = engine
        .synthesize("client-1", common::date("2024-01-01"), common::date("2024-12-31"), false)
        .await
        .unwrap();
    assert!(!synthesis.completeness.is_complete);
    assert_eq!(synthesis.completeness.failed_note_ids, vec!["n1".to_string()]);
    assert!(synthesis.recommendations[0].starts_with("Insufficient data"));
    assert!(synthesis.recommendations[1].starts_with("Incomplete data"));

    cancel.cancel();
}

#[tokio::test]
async fn test_deleted_note_is_not_tagged() {
    let (backend, db, _dir) = test_backend().await;
    let note = seed_note(&db, "n1", "client-1", "2024-03-01", FAMILY_NOTE).await;
    delete_note(&db, "n1").await;

    let tagger = AutoTagger::new(backend.clone(), Arc::new(family_script()), fast_tagging());
    assert_eq!(tagger.tag_note(&note).await, TaggingOutcome::SourceRemoved);

    assert!(backend.get_note_tags("n1").await.unwrap().is_empty());
    assert!(backend.get_note_insights("n1").await.unwrap().is_empty());
    assert!(backend.get_tagging_status("n1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_queued_tagging_links_related_notes() {
    let (backend, db, _dir) = test_backend().await;
    let second_note = "Family boundaries came up again.";
    let script = family_script().with_tags(
        second_note,
        json!({"themes": ["Family", "Boundaries"], "emotions": ["relief"]}),
    );

    let mut config = Config::default();
    config.tagging = fast_tagging();
    let cancel = CancellationToken::new();
    let (engine, dispatcher) =
        InsightEngine::start(backend.clone(), Arc::new(script), &config, cancel.clone());

    let a = seed_note(&db, "a", "client-1", "2024-03-01", FAMILY_NOTE).await;
    let b = seed_note(&db, "b", "client-1", "2024-03-08", second_note).await;

    assert!(engine.tag_note(a).wait().await.is_tagged());
    let outcome = engine.tag_note(b).wait().await;
    assert_eq!(
        outcome,
        TaggingOutcome::Tagged {
            tags_written: 2,
            insights_written: 0,
            links: 1
        }
    );

    let links = backend.get_note_cross_references("a").await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].strength, 2);
    assert_eq!(links[0].source_note_id, "a");
    assert_eq!(links[0].target_note_id, "b");

    cancel.cancel();
    dispatcher.await.unwrap();
}
