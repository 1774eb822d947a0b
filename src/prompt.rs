//! Prompt assembly for mode-aware summarization.
//!
//! The transcript is truncated to fit the mode's token budget before being
//! interpolated into the user template. Token counting prefers the generation
//! model's real tokenizer; when none is available (fallback paths, tests) a
//! whitespace-token estimate is used instead.

use tokenizers::Tokenizer;
use tracing::warn;

use crate::modes::RecordingMode;

/// Tokens reserved for template overhead around the transcript.
const PROMPT_RESERVE_TOKENS: usize = 100;

/// A rendered system/user prompt pair, ready for a chat template.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Token counting backed by the generation tokenizer when one is loaded.
#[derive(Clone, Copy, Default)]
pub struct TokenCounter<'a> {
    tokenizer: Option<&'a Tokenizer>,
}

impl<'a> TokenCounter<'a> {
    pub fn new(tokenizer: Option<&'a Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Count tokens in `text`, falling back to whitespace tokens.
    pub fn count(&self, text: &str) -> usize {
        if let Some(tokenizer) = self.tokenizer {
            match tokenizer.encode(text, false) {
                Ok(encoding) => return encoding.get_ids().len(),
                Err(err) => {
                    warn!(error = %err, "tokenizer encode failed; using whitespace estimate");
                }
            }
        }
        text.split_whitespace().count()
    }

    /// Truncate `text` so it spans at most `max_tokens` tokens.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if let Some(tokenizer) = self.tokenizer {
            match truncate_with_tokenizer(tokenizer, text, max_tokens) {
                Ok(truncated) => return truncated,
                Err(err) => {
                    warn!(error = %err, "tokenizer truncation failed; using whitespace estimate");
                }
            }
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= max_tokens {
            return text.to_owned();
        }
        words[..max_tokens].join(" ")
    }
}

fn truncate_with_tokenizer(
    tokenizer: &Tokenizer,
    text: &str,
    max_tokens: usize,
) -> anyhow::Result<String> {
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let ids = encoding.get_ids();

    if ids.len() <= max_tokens {
        return Ok(text.to_owned());
    }

    tokenizer
        .decode(&ids[..max_tokens], true)
        .map_err(|e| anyhow::anyhow!("{e}"))
}

/// Build the prompt pair for a transcript and mode.
///
/// The transcript is cut to `token_limit - 100` tokens first so the rendered
/// user message stays inside the mode's budget. In custom mode the caller
/// instruction is interpolated; when it is absent the template renders with
/// the transcript alone.
pub fn build_prompt(
    transcript: &str,
    mode: RecordingMode,
    custom_prompt: Option<&str>,
    counter: &TokenCounter<'_>,
) -> Prompt {
    let config = mode.config();

    let budget = config.token_limit.saturating_sub(PROMPT_RESERVE_TOKENS);
    let transcript = counter.truncate(transcript, budget);

    let instruction = custom_prompt.map(str::trim).filter(|p| !p.is_empty());

    let user = match (mode, instruction) {
        (RecordingMode::Custom, Some(instruction)) => config
            .user_template
            .replace("{custom_prompt}", instruction)
            .replace("{transcript}", &transcript),
        _ => config
            .user_template
            .replace("{custom_prompt}", "")
            .replace("{transcript}", &transcript)
            .trim_start()
            .to_owned(),
    };

    Prompt {
        system: config.system_prompt.to_owned(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_counter_counts_words() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count("one two three"), 3);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn truncate_is_identity_within_budget() {
        let counter = TokenCounter::default();
        assert_eq!(counter.truncate("short text", 100), "short text");
    }

    #[test]
    fn truncate_cuts_to_token_budget() {
        let counter = TokenCounter::default();
        let text = "a b c d e f g h";
        assert_eq!(counter.truncate(text, 3), "a b c");
    }

    #[test]
    fn lecture_prompt_embeds_transcript() {
        let counter = TokenCounter::default();
        let prompt = build_prompt("today we study ownership", RecordingMode::Lecture, None, &counter);

        assert!(prompt.system.contains("teaching assistant"));
        assert!(prompt.user.contains("today we study ownership"));
        assert!(!prompt.user.contains("{transcript}"));
    }

    #[test]
    fn custom_prompt_interpolates_instruction() {
        let counter = TokenCounter::default();
        let prompt = build_prompt(
            "the quarterly numbers",
            RecordingMode::Custom,
            Some("List every number mentioned."),
            &counter,
        );

        assert!(prompt.user.starts_with("List every number mentioned."));
        assert!(prompt.user.contains("the quarterly numbers"));
    }

    #[test]
    fn custom_mode_without_instruction_renders_transcript_only() {
        let counter = TokenCounter::default();
        let prompt = build_prompt("just the transcript", RecordingMode::Custom, None, &counter);

        assert!(!prompt.user.contains("{custom_prompt}"));
        assert!(prompt.user.contains("just the transcript"));
        assert!(!prompt.user.starts_with(char::is_whitespace));
    }

    #[test]
    fn long_transcript_is_truncated_to_mode_budget() {
        let counter = TokenCounter::default();
        // Meeting budget: 300 - 100 = 200 tokens.
        let transcript = vec!["word"; 1000].join(" ");
        let prompt = build_prompt(&transcript, RecordingMode::Meeting, None, &counter);

        let words_in_user = prompt
            .user
            .split_whitespace()
            .filter(|w| *w == "word")
            .count();
        assert_eq!(words_in_user, 200);
    }
}
