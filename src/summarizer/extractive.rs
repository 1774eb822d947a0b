//! Extractive fallback used when model generation is unavailable or fails.

/// Minimum sentence length worth keeping, in characters.
const MIN_SENTENCE_CHARS: usize = 20;

/// How many sentences the fallback summary keeps.
const MAX_SENTENCES: usize = 5;

/// Build a simple extractive summary: the first few substantial sentences of
/// the transcript, joined back together.
pub(super) fn extractive_summary(transcript: &str) -> String {
    let sentences: Vec<&str> = transcript
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.len() > MIN_SENTENCE_CHARS)
        .take(MAX_SENTENCES)
        .collect();

    let summary = sentences.join(". ");

    if summary.is_empty() || summary.ends_with('.') {
        summary
    } else {
        format!("{summary}.")
    }
}
