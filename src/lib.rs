//! `recap` — speech-to-text plus mode-aware summarization.
//!
//! This crate provides:
//! - Audio decoding and preprocessing (noise suppression, silence trimming,
//!   loudness normalization)
//! - Whisper-based transcription with transcript cleanup and confidence scoring
//! - Mode-aware prompt construction and local-LLM summarization with an
//!   extractive fallback
//! - An `Engine` that owns model lifecycles for long-running services
//!
//! The library is designed to be used by the bundled HTTP server as well as
//! batch jobs and tests, with an emphasis on explicit failure handling and
//! minimal surprises.

// High-level API (most consumers should start here).
pub mod engine;

// Audio decoding and preprocessing.
pub mod audio_pipeline;
pub mod decode;
pub mod decoder;
pub mod demux;
pub mod preprocess;

// Transcription and transcript post-processing.
pub mod cleanup;
pub mod segments;
pub mod transcriber;

// Mode-aware summarization.
pub mod modes;
pub mod prompt;
pub mod summarizer;

// Logging configuration and control.
pub mod logging;

mod error;

pub use engine::{Engine, EngineConfig, FullProcessingResult, ModelSize};
pub use error::{Error, Result};
pub use logging::init as init_logging;
pub use modes::RecordingMode;
pub use preprocess::PreprocessOpts;
pub use summarizer::{SummarizationResult, Summarizer};
pub use transcriber::{TranscribeOpts, Transcriber, TranscriptionResult};
