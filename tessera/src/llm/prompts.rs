//! Prompt templates for note extraction.
//!
//! Templates use plain `format!()` interpolation, so a missing variable is a
//! compile error rather than a silently empty slot.

/// System prompt shared by both extraction calls.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You annotate clinical therapy progress notes. \
Only report what the note states or clearly implies. Never invent clinical facts. \
Respond with valid JSON only.";

/// Prompt asking for categorized tags from one progress note.
///
/// The expected reply is a single JSON object keyed by category, each value a
/// list of short lowercase phrases, plus an overall `confidence`.
///
/// # Example
/// ```
/// use tessera::llm::prompts::tag_extraction_prompt;
///
/// let prompt = tag_extraction_prompt("Client reported anxiety about work deadlines.");
/// assert!(prompt.contains("work deadlines"));
/// ```
pub fn tag_extraction_prompt(note_text: &str) -> String {
    format!(
        r#"Read the therapy progress note below and tag it.

Categories:
- emotions: feelings the client expressed or displayed (e.g. "anxiety", "relief")
- themes: recurring life topics discussed (e.g. "family", "work stress", "boundaries")
- coping_strategies: techniques the client used or practised (e.g. "deep breathing", "journaling")
- risk_markers: safety concerns noted by the clinician (e.g. "self-harm ideation", "substance use")

Use short lowercase phrases. Leave a category as an empty list when the note gives no evidence for it.
Confidence: a score from 0.0 to 1.0 for how clearly the note supports the tags overall.

Progress note:
{note_text}

Respond with valid JSON only. Example format:
{{"emotions": ["anxiety"], "themes": ["work stress"], "coping_strategies": ["deep breathing"], "risk_markers": [], "confidence": 0.85}}"#
    )
}

/// Prompt asking for clinically notable observations from one progress note.
///
/// The expected reply is a JSON array of `{"type", "text"}` objects.
pub fn insight_extraction_prompt(note_text: &str) -> String {
    format!(
        r#"Read the therapy progress note below and list clinically notable observations.

Insight Types:
- breakthrough: a new realisation or shift the client achieved in session
- pattern: a recurring behaviour, thought or relational pattern
- risk: a concern that warrants clinical attention
- milestone: progress toward a treatment goal

Write each insight as one plain sentence. Return an empty array if nothing notable occurred.

Progress note:
{note_text}

Respond with valid JSON only. Example format:
[
  {{"type": "breakthrough", "text": "Client linked their anxiety to fear of disappointing their manager."}},
  {{"type": "milestone", "text": "Client set a boundary with a family member for the first time."}}
]"#
    )
}
