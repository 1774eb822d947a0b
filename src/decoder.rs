//! Decode an uploaded byte buffer into mono `f32` samples at the source's
//! native sample rate.
//!
//! This module is intentionally small and orchestration-focused:
//! - `demux` handles probing + packet iteration
//! - `decode` handles codec decoding
//! - `audio_pipeline` handles PCM normalization (downmix)
//!
//! Uploads are spilled to a temporary file before decoding. Several container
//! layouts (notably MP4/MOV with a trailing `moov` atom) require a seekable
//! source, and a plain `File` satisfies Symphonia's `MediaSource` without
//! buffering games. The spill file is deleted afterwards with a short
//! best-effort retry; a failed delete is logged and swallowed.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use symphonia::core::audio::SampleBuffer;
use tracing::warn;

use crate::audio_pipeline::decoded_to_mono;
use crate::decode::{decode_packet_and_then, make_decoder_for_track};
use crate::demux::{next_packet, probe_default_track};
use crate::error::{Error, Result};

/// Decoded upload: mono samples in `[-1.0, 1.0]` plus the native sample rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Duration of the decoded audio in seconds.
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode raw upload bytes into mono samples.
///
/// `extension_hint` is the container extension the caller inferred from the
/// upload (e.g. `"webm"`, `"mp3"`); it improves Symphonia's probe accuracy but
/// a wrong hint is not fatal.
pub fn decode_bytes(bytes: &[u8], extension_hint: &str) -> Result<DecodedAudio> {
    let spill = spill_to_temp_file(bytes, extension_hint)?;

    let decoded = decode_file(&spill, extension_hint);

    remove_with_retry(spill);

    decoded
}

fn decode_file(path: &Path, extension_hint: &str) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|e| Error::decode(format!("open spill file: {e}")))?;

    let (mut format, track) = probe_default_track(Box::new(file), Some(extension_hint))
        .map_err(Error::decode)?;

    let mut decoder = make_decoder_for_track(&track).map_err(Error::decode)?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::decode("selected track reported no sample rate"))?;

    let mut samples = Vec::<f32>::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let Some(packet) = next_packet(&mut format).map_err(Error::decode)? else {
            break;
        };

        // Ignore packets from non-audio tracks.
        if packet.track_id() != track.id {
            continue;
        }

        decode_packet_and_then(&mut decoder, &packet, |decoded| {
            let (mono, _rate) = decoded_to_mono(&decoded, &mut scratch)
                .context("failed to normalize decoded samples")?;
            samples.extend_from_slice(&mono);
            Ok(())
        })
        .map_err(Error::decode)?;
    }

    if samples.is_empty() {
        return Err(Error::decode("no decodable audio packets in upload"));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn spill_to_temp_file(bytes: &[u8], extension_hint: &str) -> Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("recap-upload-")
        .suffix(&format!(".{extension_hint}"))
        .tempfile()
        .map_err(|e| Error::decode(format!("create spill file: {e}")))?;

    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| Error::decode(format!("write spill file: {e}")))?;

    Ok(file.into_temp_path())
}

/// Delete the spill file, tolerating short-lived locks from the decoder.
///
/// Two bounded retries with small sleeps; a file that still won't go away is
/// logged and left for the OS temp cleaner.
fn remove_with_retry(spill: tempfile::TempPath) {
    let path = spill.to_path_buf();
    // `keep` detaches the auto-delete guard so the retries below own cleanup.
    let _ = spill.keep();

    for delay_ms in [50u64, 100] {
        if std::fs::remove_file(&path).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(delay_ms));
    }

    if let Err(err) = std::fs::remove_file(&path) {
        warn!(path = %path.display(), error = %err, "failed to remove audio spill file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
            for sample in samples {
                let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(pcm).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav_and_preserves_duration() -> anyhow::Result<()> {
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();
        let bytes = wav_bytes(&samples, 16_000, 1);

        let decoded = decode_bytes(&bytes, "wav")?;
        assert_eq!(decoded.sample_rate, 16_000);
        assert!((decoded.duration_seconds() - 1.0).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn decodes_stereo_wav_to_mono() -> anyhow::Result<()> {
        // Interleaved stereo: both channels carry the same tone.
        let mut interleaved = Vec::new();
        for i in 0..8_000 {
            let v = (i as f32 * 0.02).sin() * 0.4;
            interleaved.push(v);
            interleaved.push(v);
        }
        let bytes = wav_bytes(&interleaved, 8_000, 2);

        let decoded = decode_bytes(&bytes, "wav")?;
        assert_eq!(decoded.sample_rate, 8_000);
        // 8000 stereo frames → 8000 mono samples (1 second).
        assert!((decoded.duration_seconds() - 1.0).abs() < 0.05);
        Ok(())
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_bytes(b"definitely not audio", "wav").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
