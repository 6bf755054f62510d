use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::{debug, info};

/// A WAV file loaded into memory as interleaved 16-bit samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Unsupported WAV format: {}-bit {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Number of multi-channel frames in the file
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Frames that fit in `elapsed_ms` of playback, capped at the file length
    pub fn frames_at(&self, elapsed_ms: u64) -> usize {
        let frames = elapsed_ms.saturating_mul(self.sample_rate as u64) / 1000;
        (frames as usize).min(self.frame_count())
    }

    /// Convert to `sample_rate` and `channels`
    ///
    /// Channels are averaged down to mono, duplicated up from mono, and
    /// otherwise mapped round-robin. Rates are converted by linear interpolation.
    pub fn converted(self, sample_rate: u32, channels: u16) -> Self {
        let sample_rate = sample_rate.max(1);
        let channels = channels.max(1);

        if sample_rate == self.sample_rate && channels == self.channels {
            return self;
        }

        let src_channels = self.channels.max(1) as usize;
        let dst_channels = channels as usize;
        let frames = self.frame_count();

        let mut remixed = Vec::with_capacity(frames * dst_channels);
        for frame in self.samples.chunks_exact(src_channels) {
            if dst_channels == src_channels {
                remixed.extend_from_slice(frame);
            } else if dst_channels == 1 {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                remixed.push((sum / src_channels as i32) as i16);
            } else {
                remixed.extend((0..dst_channels).map(|c| frame[c % src_channels]));
            }
        }

        let samples = if sample_rate == self.sample_rate || frames == 0 {
            remixed
        } else {
            let out_frames = (frames as u64 * sample_rate as u64 / self.sample_rate as u64) as usize;
            let step = self.sample_rate as f64 / sample_rate as f64;
            let mut resampled = Vec::with_capacity(out_frames * dst_channels);

            for i in 0..out_frames {
                let pos = i as f64 * step;
                let left = (pos as usize).min(frames - 1);
                let right = (left + 1).min(frames - 1);
                let frac = pos - left as f64;

                for c in 0..dst_channels {
                    let a = remixed[left * dst_channels + c] as f64;
                    let b = remixed[right * dst_channels + c] as f64;
                    resampled.push((a + (b - a) * frac).round() as i16);
                }
            }
            resampled
        };

        debug!(
            "Converted {}: {}Hz/{}ch -> {}Hz/{}ch",
            self.path, self.sample_rate, self.channels, sample_rate, channels
        );

        let duration_seconds = samples.len() as f64 / (sample_rate as f64 * channels as f64);

        Self {
            path: self.path,
            duration_seconds,
            sample_rate,
            channels,
            samples,
        }
    }

    /// Interleaved samples for frames `[start, end)`
    pub fn frame_range(&self, start: usize, end: usize) -> &[i16] {
        let channels = self.channels.max(1) as usize;
        let end = end.min(self.frame_count());
        let start = start.min(end);
        &self.samples[start * channels..end * channels]
    }
}
