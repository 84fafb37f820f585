use std::collections::{BTreeMap, BTreeSet};

use crate::models::{normalize_value, SessionTag, TagCategory};

/// Share of the recall score left for non-exact matches.
const PARTIAL_MATCH_WEIGHT: f64 = 0.9;

/// Relevance of `field` for an already-normalized `query`.
///
/// `None` when the field does not contain the query. An exact match scores
/// 1.0 only when `exact_is_full` is set (tag values); everything else decays
/// with how much of the field the query covers.
pub fn match_relevance(query: &str, field: &str, exact_is_full: bool) -> Option<f64> {
    if query.is_empty() {
        return None;
    }

    let field = normalize_value(field);
    if !field.contains(query) {
        return None;
    }

    if exact_is_full && field == query {
        return Some(1.0);
    }

    let query_len = query.chars().count() as f64;
    let field_len = field.chars().count().max(1) as f64;
    Some(PARTIAL_MATCH_WEIGHT * (query_len / field_len).min(1.0))
}

/// Normalized values per linkable category.
pub type LinkableValues = BTreeMap<TagCategory, BTreeSet<String>>;

pub fn linkable_values<'a, I>(tags: I) -> LinkableValues
where
    I: IntoIterator<Item = &'a SessionTag>,
{
    let mut values: LinkableValues = BTreeMap::new();
    for tag in tags {
        if !tag.category.is_linkable() {
            continue;
        }
        let entry = values.entry(tag.category).or_default();
        for value in &tag.values {
            let normalized = normalize_value(value);
            if !normalized.is_empty() {
                entry.insert(normalized);
            }
        }
    }
    values
}

/// Values present in both notes within the same category, in category order.
/// A value shared under two categories counts twice.
pub fn shared_values(a: &LinkableValues, b: &LinkableValues) -> Vec<String> {
    let mut shared = Vec::new();
    for (category, values_a) in a {
        if let Some(values_b) = b.get(category) {
            shared.extend(values_a.intersection(values_b).cloned());
        }
    }
    shared
}
