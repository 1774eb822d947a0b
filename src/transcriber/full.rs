//! Whole-buffer recognition via whisper.cpp's `full()` API.

use anyhow::{Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperSegment, WhisperState};

use crate::segments::Segment;

use super::TranscribeOpts;

/// Output of one `full()` run over a sample buffer.
pub(super) struct Recognition {
    pub segments: Vec<Segment>,
    /// Mean token log-probability mapped into [0, 1].
    pub confidence: f32,
}

/// Run recognition over `samples` (16 kHz mono) and collect segments plus an
/// aggregate confidence.
pub(super) fn recognize(
    ctx: &WhisperContext,
    samples: &[f32],
    opts: &TranscribeOpts,
) -> Result<Recognition> {
    let state = run_full(ctx, samples, opts)?;

    let mut segments = Vec::new();
    let mut logprobs = Vec::new();

    for whisper_segment in state.as_iter() {
        segments.push(to_segment(&whisper_segment)?);
        collect_token_logprobs(&whisper_segment, &mut logprobs)?;
    }

    Ok(Recognition {
        segments,
        confidence: logprob_confidence(&logprobs),
    })
}

fn run_full(ctx: &WhisperContext, samples: &[f32], opts: &TranscribeOpts) -> Result<WhisperState> {
    let params = build_full_params(opts);

    let mut state = ctx
        .create_state()
        .context("failed to create whisper state")?;

    state
        .full(params, samples)
        .context("failed to run whisper full()")?;

    Ok(state)
}

fn build_full_params<'a>(opts: &'a TranscribeOpts) -> FullParams<'a, 'a> {
    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: opts.beam_size as i32,
        patience: 1.0,
    });

    params.set_n_threads(num_cpus::get() as i32);
    params.set_translate(false);
    params.set_language(opts.language.as_deref());
    params.set_no_context(true);
    params.set_single_segment(false);

    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    params.set_token_timestamps(true);

    params
}

fn to_segment(segment: &WhisperSegment) -> Result<Segment> {
    let text = segment
        .to_str()
        .context("failed to get segment text")?
        .to_owned();

    Ok(Segment {
        // whisper timestamps are centiseconds
        start_seconds: centiseconds_to_seconds(segment.start_timestamp()),
        end_seconds: centiseconds_to_seconds(segment.end_timestamp()),
        text,
    })
}

fn collect_token_logprobs(segment: &WhisperSegment, out: &mut Vec<f32>) -> Result<()> {
    let token_count = usize::try_from(segment.n_tokens()).unwrap_or(0);

    for idx in 0..token_count {
        let token = segment
            .get_token(idx as i32)
            .context("failed to get token from segment")?;

        let text = token
            .to_str()
            .with_context(|| format!("failed to get token text at index {idx}"))?;

        // Skip whisper special/control tokens (formatted like `[_BEG_]`).
        if text.starts_with("[_") && text.ends_with("_]") {
            continue;
        }

        out.push(token.token_data().plog);
    }

    Ok(())
}

/// Map mean token log-probability into a [0, 1] confidence.
///
/// A perfectly confident token has log-probability 0; -1 and below maps to
/// zero. The resulting scale matches what downstream consumers expect from
/// recognition confidence scores.
pub(super) fn logprob_confidence(logprobs: &[f32]) -> f32 {
    if logprobs.is_empty() {
        return 0.0;
    }

    let mean = logprobs.iter().sum::<f32>() / logprobs.len() as f32;
    ((mean + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn centiseconds_to_seconds(value: i64) -> f32 {
    if value < 0 { 0.0 } else { value as f32 / 100.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_of_no_tokens_is_zero() {
        assert_eq!(logprob_confidence(&[]), 0.0);
    }

    #[test]
    fn confidence_of_certain_tokens_is_half_plus() {
        // log-probability 0.0 means certainty; maps to 0.5 under the affine scale.
        assert!((logprob_confidence(&[0.0, 0.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn confidence_clamps_to_unit_interval() {
        assert_eq!(logprob_confidence(&[-10.0]), 0.0);
        assert_eq!(logprob_confidence(&[5.0]), 1.0);
    }

    #[test]
    fn centiseconds_conversion_clamps_unknown_timestamps() {
        assert_eq!(centiseconds_to_seconds(-1), 0.0);
        assert!((centiseconds_to_seconds(150) - 1.5).abs() < 1e-6);
    }
}
