//! The processing engine: owns the models and composes the pipeline.
//!
//! Models are an explicit, injected resource rather than process globals. The
//! engine lazily loads one [`Transcriber`] per requested model size and one
//! [`Summarizer`], caches them, and exposes unload hooks for memory pressure.
//!
//! Thread safety: whisper contexts create a fresh state per call but the call
//! itself takes `&mut` (the optional VAD filter is stateful), so each cached
//! transcriber sits behind its own `Mutex`. The summarizer serializes requests
//! internally because generation mutates the model's KV cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::modes::RecordingMode;
use crate::segments::Segment;
use crate::summarizer::{DEFAULT_MODEL_ID, SummarizationResult, Summarizer};
use crate::transcriber::{TranscribeOpts, Transcriber, TranscriptionResult};

/// Whisper model sizes the service can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub const ALL: [ModelSize; 5] = [
        ModelSize::Tiny,
        ModelSize::Base,
        ModelSize::Small,
        ModelSize::Medium,
        ModelSize::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }
}

impl FromStr for ModelSize {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "tiny" => ModelSize::Tiny,
            "small" => ModelSize::Small,
            "medium" => ModelSize::Medium,
            "large" => ModelSize::Large,
            // "base" and anything unrecognized
            _ => ModelSize::Base,
        })
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the engine finds its models.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding whisper.cpp weights named `ggml-<size>.bin`.
    pub model_dir: PathBuf,
    /// Optional whisper VAD model; when set, non-speech is masked before
    /// recognition.
    pub vad_model: Option<PathBuf>,
    /// Size used when a request does not name one.
    pub default_model_size: ModelSize,
    /// Hugging Face id of the generation model.
    pub summarizer_model_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            vad_model: None,
            default_model_size: ModelSize::Base,
            summarizer_model_id: DEFAULT_MODEL_ID.to_owned(),
        }
    }
}

impl EngineConfig {
    fn whisper_model_path(&self, size: ModelSize) -> PathBuf {
        self.model_dir.join(format!("ggml-{size}.bin"))
    }
}

/// Combined transcription + optional summary for the one-shot pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FullProcessingResult {
    pub raw_text: String,
    pub clean_text: String,
    pub transcription_confidence: f32,
    pub language: Option<String>,
    pub segments: Vec<Segment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_mode: Option<RecordingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_confidence: Option<f32>,
}

/// Lazily loaded, cached model pool plus pipeline composition.
pub struct Engine {
    config: EngineConfig,
    transcribers: Mutex<HashMap<ModelSize, Arc<Mutex<Transcriber>>>>,
    summarizer: Mutex<Option<Arc<Summarizer>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            transcribers: Mutex::new(HashMap::new()),
            summarizer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch (loading on first use) the transcriber for a model size.
    pub fn transcriber(&self, size: ModelSize) -> Result<Arc<Mutex<Transcriber>>> {
        let mut pool = self
            .transcribers
            .lock()
            .map_err(|_| Error::msg("transcriber pool lock poisoned"))?;

        if let Some(existing) = pool.get(&size) {
            return Ok(Arc::clone(existing));
        }

        let path = self.config.whisper_model_path(size);
        info!(size = %size, path = %path.display(), "loading whisper model");

        let mut transcriber = Transcriber::new(&path)?;
        if let Some(vad) = &self.config.vad_model {
            let vad = vad
                .to_str()
                .ok_or_else(|| Error::msg("VAD model path is not valid UTF-8"))?;
            transcriber = transcriber.with_speech_filter(vad)?;
        }

        let transcriber = Arc::new(Mutex::new(transcriber));
        pool.insert(size, Arc::clone(&transcriber));
        Ok(transcriber)
    }

    /// Fetch (loading on first use) the summarizer.
    pub fn summarizer(&self) -> Result<Arc<Summarizer>> {
        let mut cell = self
            .summarizer
            .lock()
            .map_err(|_| Error::msg("summarizer lock poisoned"))?;

        if let Some(existing) = &*cell {
            return Ok(Arc::clone(existing));
        }

        let summarizer = Arc::new(Summarizer::load(&self.config.summarizer_model_id)?);
        *cell = Some(Arc::clone(&summarizer));
        Ok(summarizer)
    }

    /// Transcribe preprocessed mono audio with the requested model size.
    pub fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        size: ModelSize,
        opts: &TranscribeOpts,
    ) -> Result<TranscriptionResult> {
        let transcriber = self.transcriber(size)?;
        let mut transcriber = transcriber
            .lock()
            .map_err(|_| Error::msg("transcriber lock poisoned"))?;
        transcriber.transcribe_chunked(samples, sample_rate, opts)
    }

    /// Summarize a transcript with the mode's profile.
    ///
    /// An empty transcript is answered immediately; it must not trigger a
    /// model load (or download) just to say there was nothing to summarize.
    pub fn summarize(
        &self,
        transcript: &str,
        mode: RecordingMode,
        custom_prompt: Option<&str>,
    ) -> Result<SummarizationResult> {
        if transcript.trim().is_empty() {
            return Ok(SummarizationResult::empty(mode));
        }
        self.summarizer()?.summarize(transcript, mode, custom_prompt)
    }

    /// Full pipeline: transcribe, then summarize the clean transcript.
    ///
    /// Summarization is best-effort; a failure there logs and leaves the
    /// summary fields absent rather than failing the whole request.
    pub fn process_and_summarize(
        &self,
        samples: &[f32],
        sample_rate: u32,
        size: ModelSize,
        opts: &TranscribeOpts,
        mode: RecordingMode,
        custom_prompt: Option<&str>,
    ) -> Result<FullProcessingResult> {
        let transcription = self.transcribe(samples, sample_rate, size, opts)?;

        let mut result = FullProcessingResult {
            raw_text: transcription.raw_text,
            clean_text: transcription.clean_text,
            transcription_confidence: transcription.confidence,
            language: transcription.language,
            segments: transcription.segments,
            summary: None,
            summary_mode: None,
            summary_tokens: None,
            summary_confidence: None,
        };

        if !result.clean_text.is_empty() {
            match self.summarize(&result.clean_text, mode, custom_prompt) {
                Ok(summary) => {
                    result.summary = Some(summary.summary);
                    result.summary_mode = Some(summary.mode);
                    result.summary_tokens = Some(summary.tokens_used);
                    result.summary_confidence = Some(summary.confidence);
                }
                Err(err) => {
                    warn!(mode = %mode, error = %err, "summarization failed; returning transcript only");
                }
            }
        }

        Ok(result)
    }

    /// Whether the transcriber for `size` is currently resident.
    pub fn transcriber_loaded(&self, size: ModelSize) -> bool {
        self.transcribers
            .lock()
            .map(|pool| pool.contains_key(&size))
            .unwrap_or(false)
    }

    /// Whether the summarizer is currently resident.
    pub fn summarizer_loaded(&self) -> bool {
        self.summarizer
            .lock()
            .map(|cell| cell.is_some())
            .unwrap_or(false)
    }

    /// Drop all cached transcribers; they reload on next use.
    pub fn unload_transcribers(&self) {
        if let Ok(mut pool) = self.transcribers.lock() {
            pool.clear();
        }
    }

    /// Drop the cached summarizer; it reloads on next use.
    pub fn unload_summarizer(&self) {
        if let Ok(mut cell) = self.summarizer.lock() {
            *cell = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_size_parses_known_values() {
        assert_eq!("tiny".parse(), Ok(ModelSize::Tiny));
        assert_eq!("LARGE".parse(), Ok(ModelSize::Large));
    }

    #[test]
    fn unknown_model_size_falls_back_to_base() {
        assert_eq!("enormous".parse(), Ok(ModelSize::Base));
        assert_eq!("".parse(), Ok(ModelSize::Base));
    }

    #[test]
    fn whisper_model_path_follows_ggml_naming() {
        let config = EngineConfig {
            model_dir: PathBuf::from("/opt/models"),
            ..Default::default()
        };
        assert_eq!(
            config.whisper_model_path(ModelSize::Small),
            PathBuf::from("/opt/models/ggml-small.bin")
        );
    }

    #[test]
    fn missing_whisper_model_surfaces_as_model_unavailable() {
        let engine = Engine::new(EngineConfig {
            model_dir: PathBuf::from("/nonexistent"),
            ..Default::default()
        });

        let err = engine.transcriber(ModelSize::Base).unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
        assert!(!engine.transcriber_loaded(ModelSize::Base));
    }

    #[test]
    fn empty_transcript_summarizes_without_a_model() -> Result<()> {
        let engine = Engine::new(EngineConfig {
            model_dir: PathBuf::from("/nonexistent"),
            ..Default::default()
        });

        let result = engine.summarize("   \n\t", RecordingMode::Meeting, None)?;
        assert_eq!(result.summary, "No transcript content to summarize.");
        assert_eq!(result.tokens_used, 0);
        assert_eq!(result.confidence, 0.0);
        assert!(!engine.summarizer_loaded());
        Ok(())
    }

    #[test]
    fn full_result_omits_absent_summary_fields() -> anyhow::Result<()> {
        let result = FullProcessingResult {
            raw_text: "raw".into(),
            clean_text: "Raw".into(),
            transcription_confidence: 0.8,
            language: Some("en".into()),
            segments: Vec::new(),
            summary: None,
            summary_mode: None,
            summary_tokens: None,
            summary_confidence: None,
        };

        let json = serde_json::to_value(&result)?;
        assert!(json.get("summary").is_none());
        assert!(json.get("summary_mode").is_none());
        assert_eq!(json["clean_text"], "Raw");
        Ok(())
    }

    #[test]
    fn engine_starts_with_nothing_loaded() {
        let engine = Engine::new(EngineConfig::default());
        assert!(!engine.summarizer_loaded());
        assert!(!engine.transcriber_loaded(ModelSize::Base));
        engine.unload_transcribers();
        engine.unload_summarizer();
    }
}
