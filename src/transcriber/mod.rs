//! Speech recognition built on whisper.cpp via `whisper-rs`.
//!
//! A [`Transcriber`] owns one loaded model and is cheap to call repeatedly:
//! whisper states are created per request, so a single context serves many
//! transcriptions. Audio arrives at its native sample rate and is resampled
//! to the 16 kHz mono that whisper expects.

mod ctx;
mod full;
mod logging;
mod vad;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use whisper_rs::WhisperContext;

use crate::audio_pipeline::resample_mono;
use crate::cleanup::cleanup_transcript;
use crate::error::Result;
use crate::preprocess::chunk_samples;
use crate::segments::Segment;

pub use vad::SpeechFilter;

/// Sample rate whisper.cpp models are trained on.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Chunk length for long recordings, in seconds.
const CHUNK_SECONDS: usize = 30;

/// Per-request recognition options.
#[derive(Debug, Clone)]
pub struct TranscribeOpts {
    /// Language hint (ISO 639-1). `None` lets the model auto-detect.
    pub language: Option<String>,
    /// Beam width for beam-search decoding.
    pub beam_size: usize,
}

impl Default for TranscribeOpts {
    fn default() -> Self {
        Self {
            language: None,
            beam_size: 5,
        }
    }
}

/// Result of one transcription request.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// Concatenated segment text as the model emitted it.
    pub raw_text: String,
    /// Raw text after the cleanup pass.
    pub clean_text: String,
    /// Aggregate recognition confidence in [0, 1].
    pub confidence: f32,
    /// Language tag the caller supplied, if any.
    pub language: Option<String>,
    /// Timestamped segments covering the upload.
    pub segments: Vec<Segment>,
}

impl TranscriptionResult {
    fn empty(language: Option<String>) -> Self {
        Self {
            raw_text: String::new(),
            clean_text: String::new(),
            confidence: 0.0,
            language,
            segments: Vec::new(),
        }
    }
}

/// A loaded whisper.cpp model plus an optional speech filter.
#[derive(Debug)]
pub struct Transcriber {
    ctx: WhisperContext,
    speech_filter: Option<SpeechFilter>,
}

impl Transcriber {
    /// Load a whisper.cpp model from disk.
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self> {
        let ctx = ctx::load_context(model_path.as_ref())?;
        Ok(Self {
            ctx,
            speech_filter: None,
        })
    }

    /// Attach a VAD model; subsequent transcriptions mask non-speech first.
    pub fn with_speech_filter(mut self, vad_model_path: &str) -> Result<Self> {
        self.speech_filter = Some(SpeechFilter::new(vad_model_path)?);
        Ok(self)
    }

    /// Transcribe a mono sample buffer.
    pub fn transcribe(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        opts: &TranscribeOpts,
    ) -> Result<TranscriptionResult> {
        if samples.is_empty() {
            return Ok(TranscriptionResult::empty(opts.language.clone()));
        }

        let mut samples_16k = resample_mono(samples, sample_rate, WHISPER_SAMPLE_RATE)?;

        if let Some(filter) = &mut self.speech_filter {
            match filter.mask_non_speech(&mut samples_16k) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("no speech detected by VAD");
                    return Ok(TranscriptionResult::empty(opts.language.clone()));
                }
                Err(err) => {
                    warn!(error = %err, "speech filter failed; transcribing unfiltered audio");
                }
            }
        }

        let recognition = full::recognize(&self.ctx, &samples_16k, opts)?;

        let raw_text = join_segment_text(&recognition.segments);
        let clean_text = cleanup_transcript(&raw_text);

        Ok(TranscriptionResult {
            raw_text,
            clean_text,
            confidence: recognition.confidence,
            language: opts.language.clone(),
            segments: recognition.segments,
        })
    }

    /// Transcribe a long recording in 30-second chunks.
    ///
    /// Each chunk's segment timestamps are shifted back onto the original
    /// timeline; the overall confidence is the mean of the nonzero chunk
    /// confidences (silent chunks do not drag the score down).
    pub fn transcribe_chunked(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        opts: &TranscribeOpts,
    ) -> Result<TranscriptionResult> {
        if samples.is_empty() {
            return Ok(TranscriptionResult::empty(opts.language.clone()));
        }

        let chunks = chunk_samples(samples, sample_rate, CHUNK_SECONDS);
        if chunks.len() <= 1 {
            return self.transcribe(samples, sample_rate, opts);
        }

        let mut segments = Vec::new();
        let mut raw_parts = Vec::new();
        let mut confidences = Vec::new();
        let mut offset_seconds = 0.0f32;

        for chunk in &chunks {
            let result = self.transcribe(chunk, sample_rate, opts)?;

            segments.extend(
                result
                    .segments
                    .into_iter()
                    .map(|s| s.offset_by(offset_seconds)),
            );

            if !result.raw_text.is_empty() {
                raw_parts.push(result.raw_text);
            }
            if result.confidence > 0.0 {
                confidences.push(result.confidence);
            }

            offset_seconds += chunk.len() as f32 / sample_rate as f32;
        }

        let raw_text = raw_parts.join(" ");
        let clean_text = cleanup_transcript(&raw_text);
        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        Ok(TranscriptionResult {
            raw_text,
            clean_text,
            confidence,
            language: opts.language.clone(),
            segments,
        })
    }
}

fn join_segment_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
