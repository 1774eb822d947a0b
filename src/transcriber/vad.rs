//! Optional speech masking via whisper.cpp's VAD models.
//!
//! The filter keeps the buffer length unchanged so segment timestamps stay
//! aligned with the original upload: speech regions pass through and
//! everything else is muted.

use anyhow::{Result, anyhow};
use whisper_rs::{WhisperVadContext, WhisperVadContextParams, WhisperVadParams, WhisperVadSegments};

const SAMPLE_RATE: f32 = 16_000.0;

/// VAD confidence threshold (higher = more conservative).
const THRESHOLD: f32 = 0.5;

/// Padding kept around each detected speech region.
const PAD_MS: u32 = 250;

/// Speech shorter than this is treated as noise.
const MIN_SPEECH_MS: u32 = 250;

/// Regions separated by less than this gap are merged.
const GAP_MERGE_MS: u32 = 300;

/// Speech detector wrapping a whisper.cpp VAD model.
#[derive(Debug)]
pub struct SpeechFilter {
    ctx: WhisperVadContext,
}

impl SpeechFilter {
    pub fn new(model_path: &str) -> Result<Self> {
        let params = WhisperVadContextParams::default();
        let ctx = WhisperVadContext::new(model_path, params)?;
        Ok(Self { ctx })
    }

    /// Mute non-speech regions in-place.
    ///
    /// Returns `Ok(true)` when any speech was detected, `Ok(false)` when the
    /// whole buffer looks like silence (the buffer is untouched in that case).
    pub fn mask_non_speech(&mut self, samples_16k_mono: &mut [f32]) -> Result<bool> {
        let mut params = WhisperVadParams::default();
        params.set_threshold(THRESHOLD);
        params.set_min_speech_duration(MIN_SPEECH_MS as i32);
        params.set_max_speech_duration(15.0);

        let detected = self.ctx.segments_from_samples(params, samples_16k_mono)?;

        let Some(ranges) = speech_ranges(&detected, samples_16k_mono.len())? else {
            return Ok(false);
        };

        mute_outside(samples_16k_mono, &ranges);
        Ok(true)
    }
}

/// Convert detected segments into sorted, merged, padded sample ranges.
fn speech_ranges(
    detected: &WhisperVadSegments,
    samples_len: usize,
) -> Result<Option<Vec<(usize, usize)>>> {
    let n = detected.num_segments();
    if n == 0 {
        return Ok(None);
    }

    let pad = ms_to_samples(PAD_MS);
    let min_speech = ms_to_samples(MIN_SPEECH_MS);
    let gap_merge = ms_to_samples(GAP_MERGE_MS);

    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for i in 0..n {
        let (mut start, mut end) = segment_sample_indexes(detected, i, samples_len)?;

        if end.saturating_sub(start) < min_speech {
            continue;
        }

        start = start.saturating_sub(pad);
        end = (end + pad).min(samples_len);

        if let Some((_, prev_end)) = ranges.last_mut() {
            if start <= *prev_end || start - *prev_end <= gap_merge {
                *prev_end = (*prev_end).max(end);
                continue;
            }
        }

        ranges.push((start, end));
    }

    if ranges.is_empty() {
        return Ok(None);
    }

    Ok(Some(ranges))
}

/// Zero everything outside the given sorted, non-overlapping ranges.
fn mute_outside(samples: &mut [f32], ranges: &[(usize, usize)]) {
    let mut cursor = 0usize;

    for &(start, end) in ranges {
        let start = start.min(samples.len());
        let end = end.min(samples.len());

        if start > cursor {
            samples[cursor..start].fill(0.0);
        }
        cursor = cursor.max(end);
    }

    if cursor < samples.len() {
        samples[cursor..].fill(0.0);
    }
}

fn segment_sample_indexes(
    detected: &WhisperVadSegments,
    i: i32,
    samples_len: usize,
) -> Result<(usize, usize)> {
    // VAD timestamps are centiseconds.
    let start_cs = detected
        .get_segment_start_timestamp(i)
        .ok_or_else(|| anyhow!("missing start timestamp for VAD segment {i}"))?;
    let end_cs = detected
        .get_segment_end_timestamp(i)
        .ok_or_else(|| anyhow!("missing end timestamp for VAD segment {i}"))?;

    let start = ((start_cs / 100.0) * SAMPLE_RATE).floor() as usize;
    let end = ((end_cs / 100.0) * SAMPLE_RATE).ceil() as usize;

    let start = start.min(samples_len);
    let end = end.min(samples_len).max(start);

    Ok((start, end))
}

fn ms_to_samples(ms: u32) -> usize {
    ((ms as f32 / 1000.0) * SAMPLE_RATE).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_outside_preserves_speech_and_zeros_the_rest() {
        let mut samples = vec![1.0f32; 10];
        mute_outside(&mut samples, &[(2, 5), (7, 9)]);

        assert_eq!(
            samples,
            vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn mute_outside_with_no_trailing_speech_zeros_the_tail() {
        let mut samples = vec![1.0f32; 6];
        mute_outside(&mut samples, &[(0, 3)]);
        assert_eq!(samples, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn ms_to_samples_rounds_at_16k() {
        assert_eq!(ms_to_samples(1000), 16_000);
        assert_eq!(ms_to_samples(250), 4_000);
    }
}
