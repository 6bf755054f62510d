// Tests for loading WAV files used by the replay recorder
//
// Fixtures are generated into a temporary directory with hound.

use anyhow::Result;
use call_capture::AudioFile;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_fixture(dir: &Path, name: &str, sample_rate: u32, channels: u16, frames: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..frames * channels as usize {
        writer.write_sample((i % 1000) as i16)?;
    }
    writer.finalize()?;

    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "call.wav", 16000, 1, 16000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 0.001, "Duration should be 1s");
    assert!(audio.path.contains("call.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_float_samples() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("float.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    writer.write_sample(0.5f32)?;
    writer.finalize()?;

    assert!(AudioFile::open(&path).is_err(), "Only 16-bit PCM is supported");

    Ok(())
}

#[test]
fn test_frames_at_follows_playback_time() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "stereo.wav", 8000, 2, 8000)?;
    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.frame_count(), 8000);
    assert_eq!(audio.frames_at(0), 0);
    assert_eq!(audio.frames_at(100), 800, "100ms at 8kHz");
    assert_eq!(audio.frames_at(60_000), 8000, "Capped at file length");

    Ok(())
}

#[test]
fn test_frame_range_is_interleaved() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "stereo.wav", 8000, 2, 100)?;
    let audio = AudioFile::open(&path)?;

    let range = audio.frame_range(10, 12);
    assert_eq!(range, &[20i16, 21, 22, 23][..]);

    assert!(audio.frame_range(90, 500).len() == 20, "End is clamped to the file");
    assert!(audio.frame_range(200, 300).is_empty());

    Ok(())
}

#[test]
fn test_converted_resamples_and_downmixes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "stereo.wav", 16000, 2, 16000)?;
    let audio = AudioFile::open(&path)?.converted(8000, 1);

    assert_eq!(audio.sample_rate, 8000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.frame_count(), 8000);
    assert!((audio.duration_seconds - 1.0).abs() < 0.001, "Duration is preserved");

    // Frame 0 averages samples 0 and 1; frame 1 lands on source frame 2 (samples 4 and 5)
    assert_eq!(audio.samples[0], 0);
    assert_eq!(audio.samples[1], 4);

    Ok(())
}

#[test]
fn test_converted_upmixes_mono() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "mono.wav", 8000, 1, 10)?;
    let audio = AudioFile::open(&path)?.converted(8000, 2);

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.frame_count(), 10);
    assert_eq!(&audio.samples[..6], &[0i16, 0, 1, 1, 2, 2][..]);

    Ok(())
}

#[test]
fn test_converted_to_same_format_is_unchanged() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), "call.wav", 16000, 1, 100)?;
    let original = AudioFile::open(&path)?;
    let samples = original.samples.clone();

    let audio = original.converted(16000, 1);
    assert_eq!(audio.samples, samples);

    Ok(())
}
