//! Heuristic confidence scoring for generated summaries.

/// Estimate how trustworthy a summary looks from surface features alone.
///
/// Scoring, applied to a base of 0.5:
/// - +0.2 when the summary is longer than 50 characters
/// - +0.1 when it contains bullet markers (`•`, `-`, `*`)
/// - +0.1 when it mentions decision/action/conclusion/key
/// - -0.3 on refusal phrasing ("i cannot", "i'm sorry")
/// - -0.2 when it has fewer than 10 words
///
/// The result is clamped to [0, 1]; an empty summary scores 0.
pub(super) fn estimate_confidence(summary: &str) -> f32 {
    if summary.is_empty() {
        return 0.0;
    }

    let lower = summary.to_lowercase();
    let mut score = 0.5f32;

    if summary.len() > 50 {
        score += 0.2;
    }
    if summary.contains('•') || summary.contains('-') || summary.contains('*') {
        score += 0.1;
    }
    if ["decision", "action", "conclusion", "key"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        score += 0.1;
    }

    if lower.contains("i cannot") || lower.contains("i'm sorry") {
        score -= 0.3;
    }
    if summary.split_whitespace().count() < 10 {
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}
