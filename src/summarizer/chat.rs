//! Chat-template rendering for the generation model.

use crate::prompt::Prompt;

/// Render a prompt pair with Qwen's ChatML template, ending with an open
/// assistant turn so the model continues from there.
pub(super) fn render_chatml(prompt: &Prompt) -> String {
    format!(
        "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
        prompt.system, prompt.user
    )
}

/// Plain-text rendering for models without a chat template.
pub(super) fn render_plain(prompt: &Prompt) -> String {
    format!(
        "System: {}\n\nUser: {}\n\nAssistant:",
        prompt.system, prompt.user
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: "Be brief.".into(),
            user: "Summarize this.".into(),
        }
    }

    #[test]
    fn chatml_has_ordered_turns_and_open_assistant() {
        let rendered = render_chatml(&prompt());

        let system_at = rendered.find("<|im_start|>system").unwrap();
        let user_at = rendered.find("<|im_start|>user").unwrap();
        let assistant_at = rendered.find("<|im_start|>assistant").unwrap();

        assert!(system_at < user_at && user_at < assistant_at);
        assert!(rendered.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn plain_fallback_ends_with_assistant_cue() {
        let rendered = render_plain(&prompt());
        assert!(rendered.starts_with("System: Be brief."));
        assert!(rendered.ends_with("Assistant:"));
    }
}
