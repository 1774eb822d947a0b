//! PCM normalization for Recap.
//!
//! Responsibilities:
//! - Convert Symphonia-decoded PCM into mono `f32`
//! - Resample mono audio between arbitrary sample rates (rubato sinc)
//!
//! The container decoder keeps audio at its native rate; the transcriber
//! resamples to whatever its recognition model expects. `finalize()` must be
//! called at end-of-stream to flush any remaining resampler input.

use anyhow::{Context, Result, anyhow, bail};
use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

/// Convert a decoded Symphonia buffer into mono `f32` samples at the source rate.
///
/// `scratch` is a reusable interleaved copy buffer; pass the same `Option`
/// across calls so it is allocated once per stream.
pub fn decoded_to_mono(
    decoded: &AudioBufferRef<'_>,
    scratch: &mut Option<SampleBuffer<f32>>,
) -> Result<(Vec<f32>, u32)> {
    if scratch.is_none() {
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;
        *scratch = Some(SampleBuffer::<f32>::new(duration, spec));
    }

    let buf = scratch
        .as_mut()
        .ok_or_else(|| anyhow!("sample buffer not initialized"))?;

    buf.copy_interleaved_ref(decoded.clone());

    let src_rate = decoded.spec().rate;
    let channels = decoded.spec().channels.count();
    if channels == 0 {
        bail!("decoded audio had zero channels");
    }

    Ok((downmix_to_mono(buf.samples(), channels), src_rate))
}

/// Downmix interleaved samples into mono by averaging channels.
///
/// Policy: equal-weight average across channels (simple, predictable).
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);

    for f in 0..frames {
        let base = f * channels;
        let mut acc = 0.0;
        for c in 0..channels {
            acc += interleaved[base + c];
        }
        mono.push(acc / channels as f32);
    }

    mono
}

/// A small stateful mono resampler built on rubato's sinc interpolator.
///
/// rubato consumes fixed-size input blocks, so samples are accumulated and
/// processed block-by-block; `finalize()` pads and flushes the remainder.
pub struct MonoResampler {
    resampler: SincFixedIn<f32>,
    acc: Vec<f32>,
}

impl MonoResampler {
    /// Create a resampler converting `src_rate` → `target_rate`.
    pub fn new(src_rate: u32, target_rate: u32) -> Result<Self> {
        // How many source frames we feed rubato per `process()` call.
        // Tradeoff: larger chunks = better throughput; smaller chunks = lower latency.
        let in_chunk_src_frames = 2048;

        let resampler = SincFixedIn::<f32>::new(
            target_rate as f64 / src_rate as f64,
            2.0,
            rubato::SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: rubato::SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            in_chunk_src_frames,
            1, // mono
        )
        .map_err(|e| anyhow!(e))
        .context("failed to init resampler")?;

        Ok(Self {
            resampler,
            acc: Vec::new(),
        })
    }

    /// Feed mono source samples; resampled output is appended to `out`.
    pub fn push(&mut self, mono_src: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.acc.extend_from_slice(mono_src);

        let in_max = self.resampler.input_frames_max();
        while self.acc.len() >= in_max {
            let block: Vec<f32> = self.acc.drain(..in_max).collect();
            process_block(&mut self.resampler, &block, out)?;
        }

        Ok(())
    }

    /// Flush remaining buffered samples at end-of-stream.
    ///
    /// rubato expects exact block sizes; the remainder is padded with zeros.
    pub fn finalize(&mut self, out: &mut Vec<f32>) -> Result<()> {
        if self.acc.is_empty() {
            return Ok(());
        }

        let in_max = self.resampler.input_frames_max();
        let rem = self.acc.len() % in_max;
        if rem != 0 {
            self.acc.resize(self.acc.len() + (in_max - rem), 0.0);
        }

        while !self.acc.is_empty() {
            let block: Vec<f32> = self.acc.drain(..in_max).collect();
            process_block(&mut self.resampler, &block, out)?;
        }

        Ok(())
    }
}

/// Resample a mono audio buffer in one call.
///
/// When `src_rate == target_rate` this is a copy; otherwise the full buffer is
/// pushed through a [`MonoResampler`] and flushed.
pub fn resample_mono(samples: &[f32], src_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if src_rate == target_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler = MonoResampler::new(src_rate, target_rate)?;
    let mut out =
        Vec::with_capacity((samples.len() as u64 * target_rate as u64 / src_rate as u64) as usize);
    resampler.push(samples, &mut out)?;
    resampler.finalize(&mut out)?;
    Ok(out)
}

fn process_block(
    resampler: &mut SincFixedIn<f32>,
    mono_src_block: &[f32],
    out: &mut Vec<f32>,
) -> Result<()> {
    // rubato's expected input shape is `Vec<Vec<f32>>` (one inner Vec per channel).
    let input = vec![mono_src_block.to_vec()];
    let processed = resampler
        .process(&input, None)
        .map_err(|e| anyhow!(e))
        .context("resampler process failed")?;

    if processed.len() != 1 {
        bail!("expected mono output from resampler");
    }

    out.extend_from_slice(&processed[0]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_to_mono_single_channel_is_identity() {
        let input = vec![0.0, 1.0, -1.0];
        let mono = downmix_to_mono(&input, 1);
        assert_eq!(mono, input);
    }

    #[test]
    fn downmix_to_mono_averages_channels() {
        // Two frames of stereo: (L=1, R=3), (L=-1, R=1) => mono: 2, 0
        let interleaved = vec![1.0, 3.0, -1.0, 1.0];
        let mono = downmix_to_mono(&interleaved, 2);
        assert_eq!(mono, vec![2.0, 0.0]);
    }

    #[test]
    fn resample_mono_same_rate_is_identity() -> anyhow::Result<()> {
        let samples = vec![0.25; 1000];
        let out = resample_mono(&samples, 16_000, 16_000)?;
        assert_eq!(out, samples);
        Ok(())
    }

    #[test]
    fn resample_mono_halves_sample_count_within_tolerance() -> anyhow::Result<()> {
        // One second at 32 kHz resampled to 16 kHz should be close to 16k frames.
        let samples = vec![0.1; 32_000];
        let out = resample_mono(&samples, 32_000, 16_000)?;

        let expected = 16_000f64;
        let actual = out.len() as f64;
        assert!(
            (actual - expected).abs() / expected < 0.10,
            "expected ~{expected} frames, got {actual}"
        );
        Ok(())
    }

    #[test]
    fn finalize_flushes_partial_block() -> anyhow::Result<()> {
        let mut resampler = MonoResampler::new(44_100, 16_000)?;
        let mut out = Vec::new();

        // Fewer samples than one rubato input block; only finalize can emit them.
        resampler.push(&vec![0.5; 100], &mut out)?;
        assert!(out.is_empty());

        resampler.finalize(&mut out)?;
        assert!(!out.is_empty());
        Ok(())
    }
}
