//! Audio capture: turn recording from a pluggable feed
//!
//! An `AudioFeed` streams raw frames (a microphone in production, a WAV
//! file in tests and the `analyze` subcommand). The `TurnRecorder` drains
//! one feed into a single normalized mono WAV per user turn, honoring the
//! shutdown token and the configured maximum turn length.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use seren_core::config::CaptureConfig;

// ============================================================================
// PUBLIC API
// ============================================================================

/// One chunk of interleaved PCM audio from a feed.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Source of audio frames for one turn.
#[async_trait]
pub trait AudioFeed: Send {
    /// Begin streaming. The feed closes the channel when exhausted.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Feed name for logging.
    fn name(&self) -> &str;
}

/// Feed that replays an existing WAV file in 100 ms chunks.
pub struct WavFileFeed {
    path: PathBuf,
}

impl WavFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AudioFeed for WavFileFeed {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let mut reader = hound::WavReader::open(&self.path)
            .with_context(|| format!("Failed to open audio file {}", self.path.display()))?;
        let spec = reader.spec();

        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to decode audio samples")?,
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to decode audio samples")?,
        };

        let sample_rate = spec.sample_rate;
        let channels = spec.channels;
        let chunk_len = ((sample_rate as usize / 10) * channels as usize).max(1);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in samples.chunks(chunk_len) {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    channels,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// One finished recording on disk.
#[derive(Debug, Clone)]
pub struct RecordedTurn {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub sample_rate: u32,
}

/// Drains an `AudioFeed` into one normalized mono WAV per turn.
#[derive(Debug, Clone)]
pub struct TurnRecorder {
    config: CaptureConfig,
}

impl TurnRecorder {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Record one turn. Returns `None` when no audio arrived before the
    /// feed closed or the shutdown token fired.
    pub async fn record(
        &self,
        feed: &mut dyn AudioFeed,
        stop: CancellationToken,
    ) -> Result<Option<RecordedTurn>> {
        let mut rx = feed.start().await?;
        tracing::debug!(feed = feed.name(), "Recording turn");

        let max_samples = (self.config.sample_rate as u64 * self.config.max_turn_seconds) as usize;
        let mut collected: Vec<i16> = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    tracing::info!("Recording interrupted by shutdown");
                    break;
                }
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    let mono = downmix(&frame.samples, frame.channels);
                    let resampled = resample(&mono, frame.sample_rate, self.config.sample_rate);
                    collected.extend_from_slice(&resampled);
                    if collected.len() >= max_samples {
                        collected.truncate(max_samples);
                        tracing::info!(
                            max_turn_seconds = self.config.max_turn_seconds,
                            "Turn reached maximum length"
                        );
                        break;
                    }
                }
            }
        }

        if collected.is_empty() {
            return Ok(None);
        }

        let path = self.write_turn_wav(&collected)?;
        let duration_secs = collected.len() as f64 / self.config.sample_rate as f64;
        tracing::debug!(path = %path.display(), duration_secs, "Recorded turn");

        Ok(Some(RecordedTurn {
            path,
            duration_secs,
            sample_rate: self.config.sample_rate,
        }))
    }

    fn write_turn_wav(&self, samples: &[i16]) -> Result<PathBuf> {
        let temp_dir = PathBuf::from(shellexpand::tilde(&self.config.temp_dir).into_owned());
        std::fs::create_dir_all(&temp_dir)
            .with_context(|| format!("Failed to create {}", temp_dir.display()))?;

        let path = temp_dir.join(format!("turn_{}.wav", Utc::now().timestamp_millis()));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for sample in samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;

        Ok(path)
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

/// Average interleaved channels down to mono.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| (frame.iter().map(|s| *s as i32).sum::<i32>() / frame.len() as i32) as i16)
        .collect()
}

/// Nearest-neighbor resampling, good enough for speech feature input.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * from_rate as u64 / to_rate as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
