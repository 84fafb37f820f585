use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::RecallConfig;
use crate::db::DatabaseBackend;
use crate::error::{Result, TesseraError};
use crate::intelligence::utils::match_relevance;
use crate::models::{
    normalize_value, rank_frequencies, DataCompleteness, DirectMatch, RecallResult,
    RelatedInsight, SessionInsight, SessionTag, TagHit, ValueFrequency,
};

/// Live substring search over one client's tags and insights.
#[derive(Clone)]
pub struct QuickRecall {
    db: Arc<dyn DatabaseBackend>,
    config: RecallConfig,
}

impl QuickRecall {
    pub fn new(db: Arc<dyn DatabaseBackend>, config: RecallConfig) -> Self {
        Self { db, config }
    }

    /// Find notes whose tag values or insight text contain `query`
    /// (case-insensitive), the insights linked to them, and the tag values
    /// that co-occur with the query.
    ///
    /// An empty query or no match yields an empty result. A query longer than
    /// `max_query_len` characters is rejected.
    pub async fn recall(&self, client_id: &str, query: &str) -> Result<RecallResult> {
        let query_len = query.chars().count();
        if query_len > self.config.max_query_len {
            return Err(TesseraError::Validation(format!(
                "query is {query_len} characters, limit is {}",
                self.config.max_query_len
            )));
        }

        let needle = normalize_value(query);
        if needle.is_empty() {
            return Ok(RecallResult::default());
        }

        let tags = self.db.get_client_tags(client_id, None).await?;
        let insights = self.db.get_client_insights(client_id).await?;

        let mut matches: Vec<DirectMatch> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        let mut entry = |note_id: &str, matches: &mut Vec<DirectMatch>| -> usize {
            *index.entry(note_id.to_string()).or_insert_with(|| {
                matches.push(DirectMatch {
                    note_id: note_id.to_string(),
                    session_date: None,
                    relevance: 0.0,
                    matched_tags: Vec::new(),
                    matched_insights: Vec::new(),
                    source_removed: false,
                });
                matches.len() - 1
            })
        };

        for tag in &tags {
            for value in &tag.values {
                if let Some(score) = match_relevance(&needle, value, true) {
                    let pos = entry(&tag.note_id, &mut matches);
                    let m = &mut matches[pos];
                    m.relevance = m.relevance.max(score);
                    m.matched_tags.push(TagHit {
                        category: tag.category,
                        value: value.clone(),
                    });
                }
            }
        }

        for insight in &insights {
            if let Some(score) = match_relevance(&needle, &insight.text, false) {
                let pos = entry(&insight.note_id, &mut matches);
                let m = &mut matches[pos];
                m.relevance = m.relevance.max(score);
                m.matched_insights.push(insight.clone());
            }
        }

        if matches.is_empty() {
            debug!(client_id, "Recall found no matches");
            return Ok(RecallResult::default());
        }

        let notes = self.db.get_client_notes(client_id, None).await?;
        let positions: HashMap<&str, (usize, NaiveDate)> = notes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), (i, n.session_date)))
            .collect();

        for m in &mut matches {
            match positions.get(m.note_id.as_str()) {
                Some(&(_, date)) => m.session_date = Some(date),
                None => m.source_removed = true,
            }
        }

        // Newest session first, same-day notes in insertion order, removed
        // sources last.
        matches.sort_by(|a, b| {
            let key = |m: &DirectMatch| {
                positions
                    .get(m.note_id.as_str())
                    .map(|&(pos, date)| (Reverse(date), pos))
            };
            match (key(a), key(b)) {
                (Some(ka), Some(kb)) => ka.cmp(&kb),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });

        let matched_notes: HashSet<&str> = matches.iter().map(|m| m.note_id.as_str()).collect();
        let related_insights = self.related(client_id, &matches, &insights).await?;
        let patterns = co_occurring(&needle, &matched_notes, &tags);

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

        debug!(
            client_id,
            direct = matches.len(),
            related = related_insights.len(),
            "Recall complete"
        );

        Ok(RecallResult {
            direct_matches: matches,
            related_insights,
            patterns,
            completeness,
        })
    }

    /// Insights of notes linked to a direct match, strongest link first.
    /// Insights already listed in a direct match are left out.
    async fn related(
        &self,
        client_id: &str,
        matches: &[DirectMatch],
        insights: &[SessionInsight],
    ) -> Result<Vec<RelatedInsight>> {
        let links = self.db.get_client_cross_references(client_id).await?;
        let matched_insights: HashSet<&str> = matches
            .iter()
            .flat_map(|m| m.matched_insights.iter().map(|i| i.id.as_str()))
            .collect();

        let mut related: Vec<RelatedInsight> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for m in matches {
            for link in &links {
                let Some(other) = link.other_endpoint(&m.note_id) else {
                    continue;
                };
                let reachable = insights
                    .iter()
                    .filter(|i| i.note_id == other && !matched_insights.contains(i.id.as_str()));

                for insight in reachable {
                    match seen.get(&insight.id) {
                        Some(&pos) if related[pos].strength >= link.strength => {}
                        Some(&pos) => {
                            related[pos].strength = link.strength;
                            related[pos].relation = link.relation;
                            related[pos].via_note_id = m.note_id.clone();
                        }
                        None => {
                            seen.insert(insight.id.clone(), related.len());
                            related.push(RelatedInsight {
                                insight: insight.clone(),
                                strength: link.strength,
                                relation: link.relation,
                                via_note_id: m.note_id.clone(),
                            });
                        }
                    }
                }
            }
        }

        related.sort_by(|a, b| b.strength.cmp(&a.strength));
        Ok(related)
    }
}

/// Tag values of the matched notes that do not themselves contain the query,
/// counted once per note.
fn co_occurring(
    needle: &str,
    matched_notes: &HashSet<&str>,
    tags: &[SessionTag],
) -> Vec<ValueFrequency> {
    let mut per_note: Vec<(&str, BTreeSet<String>)> = Vec::new();

    for tag in tags.iter().filter(|t| matched_notes.contains(t.note_id.as_str())) {
        let pos = match per_note.iter().position(|(id, _)| *id == tag.note_id) {
            Some(pos) => pos,
            None => {
                per_note.push((tag.note_id.as_str(), BTreeSet::new()));
                per_note.len() - 1
            }
        };
        for value in &tag.values {
            let value = normalize_value(value);
            if !value.is_empty() && !value.contains(needle) {
                per_note[pos].1.insert(value);
            }
        }
    }

    rank_frequencies(per_note.into_iter().flat_map(|(_, values)| values))
}
