//! Transcript text cleanup.
//!
//! Recognition output tends to carry stray whitespace, dangling spaces before
//! punctuation, duplicated words from chunk boundaries, and inconsistent
//! sentence casing. [`cleanup_transcript`] fixes those in one pass and is
//! idempotent: running it twice yields the same text.

/// Clean up raw recognition text.
///
/// Applied in order:
/// 1. collapse all whitespace runs into single spaces and trim
/// 2. drop spaces before `.`, `,`, `!` and `?`
/// 3. collapse immediate case-insensitive word repeats ("the the" -> "the")
/// 4. capitalize the first letter of each sentence
pub fn cleanup_transcript(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    let tightened = tighten_punctuation(&collapsed);
    let deduped = collapse_repeated_words(&tightened);
    capitalize_sentences(&deduped)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tighten_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '.' | ',' | '!' | '?') {
            while out.ends_with(' ') {
                out.pop();
            }
        }
        out.push(ch);
    }
    out
}

fn collapse_repeated_words(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for word in text.split(' ') {
        // Compare word bodies without trailing punctuation so "the the." still
        // collapses, but keep the later token (it carries the punctuation).
        let body = word.trim_end_matches(['.', ',', '!', '?']);
        if let Some(prev) = out.last() {
            let prev_body = prev.trim_end_matches(['.', ',', '!', '?']);
            if !body.is_empty()
                && prev_body.eq_ignore_ascii_case(body)
                && !prev.ends_with(['.', '!', '?'])
            {
                out.pop();
            }
        }
        out.push(word);
    }
    out.join(" ")
}

fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_sentence_start = true;

    for ch in text.chars() {
        if at_sentence_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
            at_sentence_start = false;
            continue;
        }

        if matches!(ch, '.' | '!' | '?') {
            at_sentence_start = true;
        } else if !ch.is_whitespace() {
            at_sentence_start = false;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(
            cleanup_transcript("  hello   world \n next  line "),
            "Hello world next line"
        );
    }

    #[test]
    fn removes_space_before_punctuation() {
        assert_eq!(
            cleanup_transcript("hello , world . how are you ?"),
            "Hello, world. How are you?"
        );
    }

    #[test]
    fn collapses_immediate_word_repeats() {
        assert_eq!(
            cleanup_transcript("the the quick quick brown fox"),
            "The quick brown fox"
        );
    }

    #[test]
    fn repeats_across_sentence_boundaries_are_kept() {
        // "Yes. Yes" is a deliberate repetition, not a recognition stutter.
        assert_eq!(cleanup_transcript("yes. yes we can"), "Yes. Yes we can");
    }

    #[test]
    fn capitalizes_each_sentence() {
        assert_eq!(
            cleanup_transcript("first sentence. second one! third? fourth"),
            "First sentence. Second one! Third? Fourth"
        );
    }

    #[test]
    fn cleanup_is_idempotent() {
        let messy = "  so   so the the meeting , went well . next steps ?  ";
        let once = cleanup_transcript(messy);
        let twice = cleanup_transcript(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_and_whitespace_only_input_yields_empty() {
        assert_eq!(cleanup_transcript(""), "");
        assert_eq!(cleanup_transcript("   \n\t "), "");
    }
}
