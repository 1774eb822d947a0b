//! Audio preprocessing for Recap.
//!
//! The stages mirror what a recording pipeline wants before recognition:
//! - noise suppression based on a noise floor estimated from the lead-in
//! - leading/trailing silence trimming with a dBFS threshold
//! - peak loudness normalization toward a target dBFS
//!
//! Every stage returns a `Result` so failures are visible, but the
//! [`preprocess`] orchestrator never lets a stage abort the pipeline: a failing
//! stage logs and passes its input through unmodified.

use tracing::warn;

use crate::decoder::{DecodedAudio, decode_bytes};
use crate::error::{Error, Result};

/// Silence threshold in dBFS. Frames quieter than this count as silence.
const SILENCE_THRESHOLD_DBFS: f32 = -40.0;

/// Minimum silent run length (ms) before leading/trailing silence is trimmed.
const MIN_SILENCE_MS: usize = 500;

/// Target peak loudness for normalization.
const TARGET_PEAK_DBFS: f32 = -3.0;

/// Analysis frame length (ms) for noise/silence detection.
const FRAME_MS: usize = 20;

/// Maximum lead-in (seconds) used to estimate the noise floor.
const NOISE_PROFILE_SECONDS: f32 = 0.5;

/// Preprocessing toggles. Normalization always runs; it is cheap and clamps.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessOpts {
    pub noise_reduction: bool,
    pub silence_trimming: bool,
}

impl Default for PreprocessOpts {
    fn default() -> Self {
        Self {
            noise_reduction: true,
            silence_trimming: true,
        }
    }
}

/// Full preprocessing pipeline: decode, then run the enabled stages.
///
/// Decoding failures are fatal (`Error::Decode`); every later stage degrades
/// gracefully to its input.
pub fn preprocess(bytes: &[u8], extension_hint: &str, opts: &PreprocessOpts) -> Result<DecodedAudio> {
    let decoded = decode_bytes(bytes, extension_hint)?;
    let sample_rate = decoded.sample_rate;
    let mut samples = decoded.samples;

    if opts.noise_reduction {
        samples = degrade_on_error("noise reduction", samples, |s| reduce_noise(s, sample_rate));
    }

    if opts.silence_trimming {
        samples = degrade_on_error("silence trimming", samples, |s| {
            trim_silence(s, sample_rate, SILENCE_THRESHOLD_DBFS, MIN_SILENCE_MS)
        });
    }

    samples = degrade_on_error("loudness normalization", samples, |s| {
        normalize_peak(s, TARGET_PEAK_DBFS)
    });

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn degrade_on_error(
    stage: &str,
    samples: Vec<f32>,
    run: impl FnOnce(&[f32]) -> Result<Vec<f32>>,
) -> Vec<f32> {
    match run(&samples) {
        Ok(processed) => processed,
        Err(err) => {
            warn!(stage, error = %err, "preprocessing stage failed; passing audio through");
            samples
        }
    }
}

/// Suppress stationary background noise.
///
/// The noise floor is the RMS of the leading ≤0.5 s of audio (or the whole
/// clip when shorter). Frames whose energy sits at or near that floor are
/// attenuated, with a linear ramp up to full gain at twice the floor so speech
/// onsets aren't chopped.
pub fn reduce_noise(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Err(Error::msg("no samples to denoise"));
    }
    if sample_rate == 0 {
        return Err(Error::msg("invalid sample rate"));
    }

    let profile_len =
        ((NOISE_PROFILE_SECONDS * sample_rate as f32) as usize).min(samples.len()).max(1);
    let noise_floor = rms(&samples[..profile_len]);

    // Nothing to suppress in an (effectively) silent profile.
    if noise_floor <= f32::EPSILON {
        return Ok(samples.to_vec());
    }

    let frame_len = frame_samples(sample_rate);
    let mut out = Vec::with_capacity(samples.len());

    for frame in samples.chunks(frame_len) {
        let energy = rms(frame);
        let gain = if energy <= noise_floor {
            0.1
        } else if energy >= noise_floor * 2.0 {
            1.0
        } else {
            // Linear ramp between the floor and 2x the floor.
            0.1 + 0.9 * (energy - noise_floor) / noise_floor
        };

        out.extend(frame.iter().map(|s| s * gain));
    }

    Ok(out)
}

/// Strip leading and trailing silence.
///
/// A run of frames below `threshold_dbfs` is trimmed only when it lasts at
/// least `min_silence_ms`; shorter pauses at the edges are preserved.
pub fn trim_silence(
    samples: &[f32],
    sample_rate: u32,
    threshold_dbfs: f32,
    min_silence_ms: usize,
) -> Result<Vec<f32>> {
    if sample_rate == 0 {
        return Err(Error::msg("invalid sample rate"));
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let frame_len = frame_samples(sample_rate);
    let frame_count = samples.len().div_ceil(frame_len);
    let min_silence_frames = min_silence_ms.div_ceil(FRAME_MS);

    let is_silent: Vec<bool> = (0..frame_count)
        .map(|i| {
            let start = i * frame_len;
            let end = (start + frame_len).min(samples.len());
            amp_to_dbfs(rms(&samples[start..end])) < threshold_dbfs
        })
        .collect();

    let leading = is_silent.iter().take_while(|s| **s).count();
    let trailing = is_silent.iter().rev().take_while(|s| **s).count();

    // Fully silent input trims to nothing (if the run is long enough).
    if leading >= frame_count {
        return Ok(if leading >= min_silence_frames {
            Vec::new()
        } else {
            samples.to_vec()
        });
    }

    let start = if leading >= min_silence_frames {
        leading * frame_len
    } else {
        0
    };
    let end = if trailing >= min_silence_frames {
        samples.len() - (trailing * frame_len).min(samples.len())
    } else {
        samples.len()
    };

    if start >= end {
        return Ok(Vec::new());
    }

    Ok(samples[start..end].to_vec())
}

/// Scale peak amplitude toward `target_dbfs` and clamp to `[-1.0, 1.0]`.
///
/// Gain is only applied upward; audio already louder than the target is left
/// alone (the clamp still protects against out-of-range input).
pub fn normalize_peak(samples: &[f32], target_dbfs: f32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let current_dbfs = amp_to_dbfs(peak);
    let gain_db = target_dbfs - current_dbfs;

    let gain = if gain_db > 0.0 {
        10f32.powf(gain_db / 20.0)
    } else {
        1.0
    };

    Ok(samples
        .iter()
        .map(|s| (s * gain).clamp(-1.0, 1.0))
        .collect())
}

/// Split audio into chunks of at most `max_seconds` for batch transcription.
pub fn chunk_samples(samples: &[f32], sample_rate: u32, max_seconds: usize) -> Vec<Vec<f32>> {
    let chunk_len = (max_seconds * sample_rate as usize).max(1);
    samples
        .chunks(chunk_len)
        .filter(|c| !c.is_empty())
        .map(|c| c.to_vec())
        .collect()
}

/// Amplitude (linear, 1.0 = full scale) to dBFS.
pub fn amp_to_dbfs(amp: f32) -> f32 {
    if !amp.is_finite() || amp <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * amp.log10()
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

fn frame_samples(sample_rate: u32) -> usize {
    ((sample_rate as usize * FRAME_MS) / 1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * amplitude).collect()
    }

    #[test]
    fn reduce_noise_errors_on_empty_input() {
        assert!(reduce_noise(&[], 16_000).is_err());
    }

    #[test]
    fn reduce_noise_keeps_loud_speech_mostly_intact() -> crate::Result<()> {
        // Quiet lead-in, loud middle.
        let mut samples = tone(8_000, 0.01);
        samples.extend(tone(16_000, 0.8));

        let out = reduce_noise(&samples, 16_000)?;
        assert_eq!(out.len(), samples.len());

        let loud_in: f32 = samples[8_000..].iter().map(|s| s.abs()).sum();
        let loud_out: f32 = out[8_000..].iter().map(|s| s.abs()).sum();
        assert!(loud_out > loud_in * 0.95, "speech region was suppressed");
        Ok(())
    }

    #[test]
    fn reduce_noise_attenuates_noise_floor() -> crate::Result<()> {
        let mut samples = tone(8_000, 0.01);
        samples.extend(tone(16_000, 0.8));
        // Trailing region at the same level as the noise profile.
        samples.extend(tone(8_000, 0.01));

        let out = reduce_noise(&samples, 16_000)?;
        let tail_in: f32 = samples[24_000..].iter().map(|s| s.abs()).sum();
        let tail_out: f32 = out[24_000..].iter().map(|s| s.abs()).sum();
        assert!(tail_out < tail_in, "noise-level tail was not attenuated");
        Ok(())
    }

    #[test]
    fn failing_stage_passes_input_through_unchanged() {
        let samples = tone(1_000, 0.5);
        let out = degrade_on_error("broken stage", samples.clone(), |_| {
            Err(Error::msg("stage blew up"))
        });
        assert_eq!(out, samples);
    }

    #[test]
    fn succeeding_stage_replaces_input() {
        let samples = tone(1_000, 0.5);
        let out = degrade_on_error("halver", samples, |s| {
            Ok(s.iter().map(|v| v * 0.5).collect())
        });
        assert!(out.iter().all(|v| v.abs() <= 0.25));
    }

    #[test]
    fn trim_silence_strips_long_leading_run() -> crate::Result<()> {
        // 1 s of silence then 1 s of tone at 16 kHz.
        let mut samples = vec![0.0f32; 16_000];
        samples.extend(tone(16_000, 0.5));

        let out = trim_silence(&samples, 16_000, -40.0, 500)?;
        assert!(out.len() <= 16_000 + frame_samples(16_000));
        Ok(())
    }

    #[test]
    fn trim_silence_keeps_short_pauses() -> crate::Result<()> {
        // 100 ms of silence (below the 500 ms minimum) then tone.
        let mut samples = vec![0.0f32; 1_600];
        samples.extend(tone(16_000, 0.5));

        let out = trim_silence(&samples, 16_000, -40.0, 500)?;
        assert_eq!(out.len(), samples.len());
        Ok(())
    }

    #[test]
    fn trim_silence_fully_silent_input_trims_to_empty() -> crate::Result<()> {
        let samples = vec![0.0f32; 16_000];
        let out = trim_silence(&samples, 16_000, -40.0, 500)?;
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn normalize_peak_raises_quiet_audio() -> crate::Result<()> {
        let samples = tone(1_000, 0.1);
        let out = normalize_peak(&samples, -3.0)?;

        let peak = out.iter().fold(0.0f32, |a, s| a.max(s.abs()));
        let target = 10f32.powf(-3.0 / 20.0);
        assert!((peak - target).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn normalize_peak_never_exceeds_full_scale() -> crate::Result<()> {
        let samples = vec![0.9, -1.5, 2.0, -0.2];
        let out = normalize_peak(&samples, -3.0)?;
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
        Ok(())
    }

    #[test]
    fn chunk_samples_splits_and_preserves_total_length() {
        let samples = vec![0.1f32; 16_000 * 70];
        let chunks = chunk_samples(&samples, 16_000, 30);

        assert_eq!(chunks.len(), 3);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, samples.len());
    }

    #[test]
    fn amp_to_dbfs_handles_degenerate_input() {
        assert_eq!(amp_to_dbfs(0.0), f32::NEG_INFINITY);
        assert_eq!(amp_to_dbfs(-1.0), f32::NEG_INFINITY);
        assert!((amp_to_dbfs(1.0) - 0.0).abs() < 1e-6);
    }
}
