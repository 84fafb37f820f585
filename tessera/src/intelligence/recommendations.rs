//! Deterministic recommendation rules over a journey aggregate.
//!
//! Rules run in a fixed order and never call out to the extraction
//! capability, so every rule can be exercised with a hand-built
//! [`JourneyAggregate`].

use std::fmt;

use crate::config::RuleThresholds;
use crate::models::{ProgressIndicators, ValueFrequency};

/// Inputs the rules look at, computed once per synthesis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JourneyAggregate {
    pub tag_count: usize,
    pub insight_count: usize,
    pub indicators: ProgressIndicators,
    pub dominant_themes: Vec<ValueFrequency>,
    /// Number of sessions each coping strategy was mentioned in, ranked.
    pub coping_mentions: Vec<ValueFrequency>,
    /// Risk insights plus risk-marker values, one entry per session in
    /// chronological order.
    pub session_risk: Vec<usize>,
    pub failed_notes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    InsufficientData,
    IncompleteData { failed_notes: usize },
    RisingRiskLowCoping,
    RiskWithoutCoping { risk_count: usize },
    RecurringThemeFocus { theme: String, sessions: usize },
    ReinforceCoping { strategy: String, sessions: usize },
    AcknowledgeMilestones { count: usize },
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => write!(
                f,
                "Insufficient data: no tags or insights have been recorded for this period yet"
            ),
            Self::IncompleteData { failed_notes } => write!(
                f,
                "Incomplete data: {failed_notes} session note(s) could not be tagged and are not reflected here"
            ),
            Self::RisingRiskLowCoping => write!(
                f,
                "Risk indicators are rising while coping strategy use is low; review the safety plan and reinforce coping skills"
            ),
            Self::RiskWithoutCoping { risk_count } => write!(
                f,
                "{risk_count} risk indicator(s) recorded with no coping strategies noted; consider introducing coping skills"
            ),
            Self::RecurringThemeFocus { theme, sessions } => write!(
                f,
                "\"{theme}\" came up in {sessions} sessions; consider making it an explicit treatment focus"
            ),
            Self::ReinforceCoping { strategy, sessions } => write!(
                f,
                "Breakthroughs are occurring alongside regular use of \"{strategy}\" ({sessions} sessions); reinforce this strategy"
            ),
            Self::AcknowledgeMilestones { count } => write!(
                f,
                "{count} milestone(s) reached; acknowledge this progress with the client"
            ),
        }
    }
}

pub fn evaluate_rules(aggregate: &JourneyAggregate, thresholds: &RuleThresholds) -> Vec<Recommendation> {
    if aggregate.tag_count == 0 && aggregate.insight_count == 0 {
        let mut out = vec![Recommendation::InsufficientData];
        if aggregate.failed_notes > 0 {
            out.push(Recommendation::IncompleteData {
                failed_notes: aggregate.failed_notes,
            });
        }
        return out;
    }

    let mut out = Vec::new();

    if aggregate.failed_notes > 0 {
        out.push(Recommendation::IncompleteData {
            failed_notes: aggregate.failed_notes,
        });
    }

    let strongest_coping = aggregate
        .coping_mentions
        .first()
        .filter(|c| c.count >= thresholds.min_coping_mentions);

    let rising = risk_is_rising(&aggregate.session_risk);
    if rising && strongest_coping.is_none() {
        out.push(Recommendation::RisingRiskLowCoping);
    }

    let risk_count = aggregate.session_risk.iter().sum::<usize>();
    let rising_fired = matches!(out.last(), Some(Recommendation::RisingRiskLowCoping));
    if !rising_fired && risk_count > 0 && aggregate.coping_mentions.is_empty() {
        out.push(Recommendation::RiskWithoutCoping { risk_count });
    }

    if let Some(top) = aggregate.dominant_themes.first() {
        if top.count >= thresholds.recurring_theme_sessions {
            out.push(Recommendation::RecurringThemeFocus {
                theme: top.value.clone(),
                sessions: top.count,
            });
        }
    }

    if aggregate.indicators.breakthrough_count > 0 {
        if let Some(coping) = strongest_coping {
            out.push(Recommendation::ReinforceCoping {
                strategy: coping.value.clone(),
                sessions: coping.count,
            });
        }
    }

    if aggregate.indicators.milestone_count > 0 {
        out.push(Recommendation::AcknowledgeMilestones {
            count: aggregate.indicators.milestone_count,
        });
    }

    out
}

/// Later half of the sessions carries more risk than the earlier half.
/// With an odd count the middle session belongs to neither half.
fn risk_is_rising(session_risk: &[usize]) -> bool {
    let n = session_risk.len();
    if n < 2 {
        return false;
    }
    let half = n / 2;
    let earlier: usize = session_risk[..half].iter().sum();
    let later: usize = session_risk[n - half..].iter().sum();
    later > earlier
}
