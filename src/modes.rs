//! Recording modes and their summarization profiles.
//!
//! Each mode pairs a token budget with a system prompt and user template
//! tuned for that kind of recording. Unknown mode strings fail soft to
//! [`RecordingMode::Lecture`] so a typo in a client never turns into a 400.

use std::str::FromStr;

use serde::Serialize;

/// What kind of recording the upload is, which drives the summary shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    Lecture,
    Meeting,
    Interview,
    Custom,
}

impl RecordingMode {
    pub const ALL: [RecordingMode; 4] = [
        RecordingMode::Lecture,
        RecordingMode::Meeting,
        RecordingMode::Interview,
        RecordingMode::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingMode::Lecture => "lecture",
            RecordingMode::Meeting => "meeting",
            RecordingMode::Interview => "interview",
            RecordingMode::Custom => "custom",
        }
    }

    /// The summarization profile for this mode.
    pub fn config(&self) -> &'static ModeConfig {
        match self {
            RecordingMode::Lecture => &LECTURE,
            RecordingMode::Meeting => &MEETING,
            RecordingMode::Interview => &INTERVIEW,
            RecordingMode::Custom => &CUSTOM,
        }
    }
}

impl FromStr for RecordingMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "meeting" => RecordingMode::Meeting,
            "interview" => RecordingMode::Interview,
            "custom" => RecordingMode::Custom,
            // "lecture" and anything unrecognized
            _ => RecordingMode::Lecture,
        })
    }
}

impl std::fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summarization profile: generation budget plus the prompt pair.
///
/// `user_template` contains a `{transcript}` placeholder; the custom mode's
/// template additionally contains `{custom_prompt}`.
#[derive(Debug)]
pub struct ModeConfig {
    pub token_limit: usize,
    pub system_prompt: &'static str,
    pub user_template: &'static str,
}

static LECTURE: ModeConfig = ModeConfig {
    token_limit: 400,
    system_prompt: "You are a helpful teaching assistant. Summarize the lecture transcript into structured notes with:
- Key concepts and definitions
- Important points under each concept
- Any examples mentioned
- Main takeaways

Format as markdown with clear sections. Prioritize educational value.",
    user_template: "Create structured notes from this lecture transcript. Focus on concepts, definitions, and key learning points:

{transcript}",
};

static MEETING: ModeConfig = ModeConfig {
    token_limit: 300,
    system_prompt: "You are a professional meeting assistant. Extract and organize meeting content into:
- Key decisions made
- Action items with owners (if mentioned)
- Discussion topics
- Next steps

Use clear formatting with bullet points. Prioritize actionable outcomes.",
    user_template: "Extract meeting details from this transcript. Focus on decisions, action items, and next steps:

{transcript}",
};

static INTERVIEW: ModeConfig = ModeConfig {
    token_limit: 350,
    system_prompt: "You are an analyst reviewing an interview. Extract:
- Questions asked and their responses
- Key information shared by the interviewee
- Speaker intent and tone
- Important quotable statements

Format as Q&A pairs when clear, otherwise summarize by topic.",
    user_template: "Analyze this interview transcript. Extract questions, answers, and key information:

{transcript}",
};

static CUSTOM: ModeConfig = ModeConfig {
    token_limit: 500,
    system_prompt: "You are a helpful AI assistant. Follow the user's custom instructions to process this transcript.",
    user_template: "{custom_prompt}

Transcript to process:
{transcript}",
};
