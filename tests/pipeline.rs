//! End-to-end tests for the audio and prompt pipeline that run without any
//! model files: audio is synthesized in memory with hound.

use recap::preprocess::{PreprocessOpts, chunk_samples, preprocess};
use recap::prompt::{TokenCounter, build_prompt};
use recap::cleanup::cleanup_transcript;
use recap::decoder::decode_bytes;
use recap::modes::RecordingMode;
use recap::{Engine, EngineConfig, Error, ModelSize};

fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
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

fn tone(len: usize, amplitude: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.05).sin() * amplitude).collect()
}

#[test]
fn preprocess_trims_silent_lead_in_and_normalizes() -> anyhow::Result<()> {
    // 1 s of silence, then 2 s of a quiet tone at 16 kHz.
    let mut samples = vec![0.0f32; 16_000];
    samples.extend(tone(32_000, 0.1));
    let bytes = wav_bytes(&samples, 16_000);

    let audio = preprocess(&bytes, "wav", &PreprocessOpts::default())?;

    // Silence trimmed away, roughly the tone remains.
    assert!(audio.duration_seconds() < 2.5);
    assert!(audio.duration_seconds() > 1.5);

    // Normalized toward -3 dBFS: peak well above the original 0.1.
    let peak = audio.samples.iter().fold(0.0f32, |a, s| a.max(s.abs()));
    assert!(peak > 0.5, "peak was {peak}");
    Ok(())
}

#[test]
fn preprocess_of_fully_silent_audio_yields_empty_buffer() -> anyhow::Result<()> {
    let bytes = wav_bytes(&vec![0.0f32; 32_000], 16_000);
    let audio = preprocess(&bytes, "wav", &PreprocessOpts::default())?;
    assert!(audio.samples.is_empty());
    Ok(())
}

#[test]
fn preprocess_with_stages_disabled_keeps_duration() -> anyhow::Result<()> {
    let mut samples = vec![0.0f32; 16_000];
    samples.extend(tone(16_000, 0.3));
    let bytes = wav_bytes(&samples, 16_000);

    let opts = PreprocessOpts {
        noise_reduction: false,
        silence_trimming: false,
    };
    let audio = preprocess(&bytes, "wav", &opts)?;

    assert!((audio.duration_seconds() - 2.0).abs() < 0.05);
    Ok(())
}

#[test]
fn decode_rejects_non_audio_payload() {
    let err = decode_bytes(b"this is not an audio container", "wav").unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn chunking_covers_the_whole_recording() -> anyhow::Result<()> {
    // 95 seconds at 8 kHz, chunked at 30 s: 30 + 30 + 30 + 5.
    let bytes = wav_bytes(&tone(8_000 * 95, 0.4), 8_000);
    let audio = preprocess(
        &bytes,
        "wav",
        &PreprocessOpts {
            noise_reduction: false,
            silence_trimming: false,
        },
    )?;

    let chunks = chunk_samples(&audio.samples, audio.sample_rate, 30);
    assert_eq!(chunks.len(), 4);
    assert_eq!(
        chunks.iter().map(|c| c.len()).sum::<usize>(),
        audio.samples.len()
    );
    Ok(())
}

#[test]
fn cleanup_composes_with_prompt_building() {
    let cleaned = cleanup_transcript("so so we we decided , to ship friday .");
    assert_eq!(cleaned, "So we decided, to ship friday.");

    let counter = TokenCounter::default();
    let prompt = build_prompt(&cleaned, RecordingMode::Meeting, None, &counter);
    assert!(prompt.user.contains(&cleaned));
    assert!(prompt.system.contains("meeting assistant"));
}

#[test]
fn bogus_mode_string_behaves_exactly_like_lecture() {
    let counter = TokenCounter::default();
    let transcript = "the lecture covered borrowing and lifetimes in depth";

    let bogus: RecordingMode = "definitely-not-a-mode".parse().unwrap();
    let lecture = build_prompt(transcript, RecordingMode::Lecture, None, &counter);
    let fallback = build_prompt(transcript, bogus, None, &counter);

    assert_eq!(lecture, fallback);
}

#[test]
fn engine_reports_missing_models_cleanly() {
    let engine = Engine::new(EngineConfig {
        model_dir: std::path::PathBuf::from("/definitely/not/here"),
        ..Default::default()
    });

    let err = engine
        .transcribe(&[0.0f32; 1600], 16_000, ModelSize::Tiny, &Default::default())
        .unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable(_)));
    assert!(!engine.transcriber_loaded(ModelSize::Tiny));
}
