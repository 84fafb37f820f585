use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::RuleThresholds;
use crate::db::DatabaseBackend;
use crate::error::{Result, TesseraError};
use crate::intelligence::{evaluate_rules, JourneyAggregate};
use crate::models::{
    normalize_value, now_timestamp, rank_frequencies, DataCompleteness, DateRange, InsightType,
    JourneySynthesis, ProgressIndicators, ProgressNote, SessionInsight, SessionTag, TagCategory,
    TrajectoryPoint, ValueFrequency,
};

/// Builds and caches per-client journey syntheses.
#[derive(Clone)]
pub struct JourneySynthesizer {
    db: Arc<dyn DatabaseBackend>,
    rules: RuleThresholds,
}

impl JourneySynthesizer {
    pub fn new(db: Arc<dyn DatabaseBackend>, rules: RuleThresholds) -> Self {
        Self { db, rules }
    }

    /// Return the cached synthesis for the exact range when it is still
    /// current, otherwise recompute and cache it.
    ///
    /// A client with no data gets empty aggregates and an insufficient-data
    /// recommendation. Only `start > end` is an error.
    pub async fn synthesize(
        &self,
        client_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        force_regenerate: bool,
    ) -> Result<JourneySynthesis> {
        if start > end {
            return Err(TesseraError::InvalidRange { start, end });
        }
        let range = DateRange::new(start, end);

        if !force_regenerate {
            if let Some(cached) = self.db.get_cached_synthesis(client_id, &range).await? {
                if !self.is_stale(&cached).await? {
                    debug!(client_id, %start, %end, "Synthesis cache hit");
                    return Ok(cached);
                }
                debug!(client_id, %start, %end, "Cached synthesis is stale");
            }
        }

        self.regenerate(client_id, &range).await
    }

    /// Whether `cached` no longer reflects the store: a newer tag or insight
    /// exists in its range, or it was incomplete and tagging progressed since.
    pub async fn is_stale(&self, cached: &JourneySynthesis) -> Result<bool> {
        let range = DateRange::new(cached.range_start, cached.range_end);
        let latest = self
            .db
            .latest_source_version(&cached.client_id, &range)
            .await?;
        if cached.is_stale_against(latest) {
            return Ok(true);
        }

        if !cached.completeness.is_complete {
            let changed = self.db.latest_status_change(&cached.client_id).await?;
            if changed.is_some_and(|changed| changed > cached.generated_at) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn regenerate(&self, client_id: &str, range: &DateRange) -> Result<JourneySynthesis> {
        let notes = self.db.get_client_notes(client_id, Some(range)).await?;
        let order: HashMap<&str, (usize, NaiveDate)> = notes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), (i, n.session_date)))
            .collect();

        // Chronological by note, insertion order within a note
        let mut tags: Vec<SessionTag> = self
            .db
            .get_client_tags(client_id, None)
            .await?
            .into_iter()
            .filter(|t| order.contains_key(t.note_id.as_str()))
            .collect();
        tags.sort_by_key(|t| order[t.note_id.as_str()].0);

        let mut insights: Vec<SessionInsight> = self
            .db
            .get_client_insights(client_id)
            .await?
            .into_iter()
            .filter(|i| order.contains_key(i.note_id.as_str()))
            .collect();
        insights.sort_by_key(|i| order[i.note_id.as_str()].0);

        let statuses: HashMap<String, _> = self
            .db
            .get_client_tagging_statuses(client_id)
            .await?
            .into_iter()
            .map(|s| (s.note_id.clone(), s.state))
            .collect();
        let completeness = DataCompleteness::from_states(
            notes
                .iter()
                .map(|n| (n.id.as_str(), statuses.get(&n.id).copied())),
        );

        let dominant_themes = rank_frequencies(
            tags.iter()
                .filter(|t| t.category == TagCategory::Themes)
                .flat_map(|t| t.values.iter().map(|v| normalize_value(v))),
        );

        let emotional_trajectory = trajectory(&tags, &order);
        let progress_indicators = indicators(&insights);

        let aggregate = JourneyAggregate {
            tag_count: tags.len(),
            insight_count: insights.len(),
            indicators: progress_indicators,
            dominant_themes: dominant_themes.clone(),
            coping_mentions: coping_mentions(&tags),
            session_risk: session_risk(&notes, &tags, &insights),
            failed_notes: completeness.failed_note_ids.len(),
        };
        let recommendations = evaluate_rules(&aggregate, &self.rules)
            .iter()
            .map(ToString::to_string)
            .collect();

        let source_tag_version = tags
            .iter()
            .map(|t| t.created_at)
            .chain(insights.iter().map(|i| i.created_at))
            .max();

        let synthesis = JourneySynthesis {
            client_id: client_id.to_string(),
            range_start: range.start,
            range_end: range.end,
            dominant_themes,
            emotional_trajectory,
            progress_indicators,
            recommendations,
            generated_at: now_timestamp(),
            source_tag_version,
            completeness,
        };

        if let Err(e) = self.db.upsert_cached_synthesis(&synthesis).await {
            warn!(client_id, error = %e, "Failed to cache journey synthesis");
        }

        info!(
            client_id,
            start = %range.start,
            end = %range.end,
            notes = notes.len(),
            tags = tags.len(),
            insights = insights.len(),
            complete = synthesis.completeness.is_complete,
            "Journey synthesis generated"
        );

        Ok(synthesis)
    }
}

/// One point per session date with emotion tags; same-day notes merged.
fn trajectory(
    tags: &[SessionTag],
    order: &HashMap<&str, (usize, NaiveDate)>,
) -> Vec<TrajectoryPoint> {
    let mut by_date: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();

    for tag in tags.iter().filter(|t| t.category == TagCategory::Emotions) {
        let Some(&(_, date)) = order.get(tag.note_id.as_str()) else {
            continue;
        };
        let emotions = by_date.entry(date).or_default();
        for value in &tag.values {
            let value = normalize_value(value);
            if !value.is_empty() && !emotions.contains(&value) {
                emotions.push(value);
            }
        }
    }

    by_date
        .into_iter()
        .filter(|(_, emotions)| !emotions.is_empty())
        .map(|(session_date, emotions)| TrajectoryPoint {
            session_date,
            emotions,
        })
        .collect()
}

fn indicators(insights: &[SessionInsight]) -> ProgressIndicators {
    let mut counts = ProgressIndicators::default();
    for insight in insights {
        match insight.insight_type {
            InsightType::Breakthrough => counts.breakthrough_count += 1,
            InsightType::Pattern => counts.pattern_count += 1,
            InsightType::Risk => counts.risk_count += 1,
            InsightType::Milestone => counts.milestone_count += 1,
        }
    }
    counts
}

/// Sessions per coping strategy: a strategy counts once per note.
fn coping_mentions(tags: &[SessionTag]) -> Vec<ValueFrequency> {
    rank_frequencies(
        tags.iter()
            .filter(|t| t.category == TagCategory::CopingStrategies)
            .flat_map(|t| {
                t.values
                    .iter()
                    .map(|v| normalize_value(v))
                    .filter(|v| !v.is_empty())
                    .collect::<BTreeSet<_>>()
            }),
    )
}

/// Risk signal per contributing note, chronological. Notes with no derived
/// data are skipped so untagged sessions do not read as zero risk.
fn session_risk(
    notes: &[ProgressNote],
    tags: &[SessionTag],
    insights: &[SessionInsight],
) -> Vec<usize> {
    notes
        .iter()
        .filter_map(|note| {
            let note_tags: Vec<&SessionTag> =
                tags.iter().filter(|t| t.note_id == note.id).collect();
            let note_insights: Vec<&SessionInsight> =
                insights.iter().filter(|i| i.note_id == note.id).collect();
            if note_tags.is_empty() && note_insights.is_empty() {
                return None;
            }

            let markers: usize = note_tags
                .iter()
                .filter(|t| t.category == TagCategory::RiskMarkers)
                .map(|t| t.values.len())
                .sum();
            let risks = note_insights
                .iter()
                .filter(|i| i.insight_type == InsightType::Risk)
                .count();
            Some(markers + risks)
        })
        .collect()
}
