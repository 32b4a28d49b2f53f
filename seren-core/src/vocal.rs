//! Vocal biomarker extraction: acoustic features from recorded audio
//!
//! Approximates clinical voice measures (pitch jitter, shimmer, loudness
//! variability) with frame-based DSP: normalized-autocorrelation pitch
//! tracking plus RMS loudness statistics. Extraction never fails; decode
//! or analysis errors degrade to zeroed features carrying the reason so a
//! session can always proceed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// FEATURE NAMES
// ============================================================================

pub const F0_MEAN: &str = "f0_mean";
pub const F0_STDDEV: &str = "f0_stddev";
pub const JITTER_LOCAL: &str = "jitter_local";
pub const SHIMMER_LOCAL: &str = "shimmer_local";
pub const LOUDNESS_MEAN: &str = "loudness_mean";
pub const LOUDNESS_STDDEV: &str = "loudness_stddev";
pub const SPEAKING_RATE: &str = "speaking_rate";
pub const VOCAL_STABILITY_SCORE: &str = "vocal_stability_score";

/// Analysis frame length and hop, in milliseconds.
const FRAME_MS: usize = 40;
const HOP_MS: usize = 10;

/// Pitch search band for adult speech.
const MIN_PITCH_HZ: f64 = 60.0;
const MAX_PITCH_HZ: f64 = 400.0;

/// A frame is voiced when its best normalized autocorrelation peak
/// reaches this value and its RMS clears the silence floor.
const VOICING_CORR_THRESHOLD: f64 = 0.5;
const SILENCE_RMS_FLOOR: f64 = 0.005;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Audio decode/analysis errors
#[derive(Error, Debug)]
pub enum VocalError {
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] hound::Error),

    #[error("Audio sample contained no frames")]
    Empty,
}

/// In-memory mapping of named acoustic features to real numbers.
///
/// Every value is finite (NaN and infinities are normalized to `0.0`).
/// A degraded mapping carries an `error` description and zeroed features.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Biomarkers {
    #[serde(flatten)]
    values: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Biomarkers {
    /// The fallback mapping used when extraction fails.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(F0_MEAN.to_string(), 0.0);
        values.insert(JITTER_LOCAL.to_string(), 0.0);
        values.insert(LOUDNESS_MEAN.to_string(), 0.0);

        Self {
            values,
            error: Some(reason.into()),
        }
    }

    /// Feature value by name, `0.0` when absent.
    pub fn get(&self, feature: &str) -> f64 {
        self.values.get(feature).copied().unwrap_or(0.0)
    }

    pub fn jitter_local(&self) -> f64 {
        self.get(JITTER_LOCAL)
    }

    pub fn loudness_mean(&self) -> f64 {
        self.get(LOUDNESS_MEAN)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// JSON rendering of the mapping, as embedded in analysis prompts.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Extracts the biomarker mapping from a recorded WAV file.
#[derive(Debug, Clone, Default)]
pub struct BiomarkerExtractor;

impl BiomarkerExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Analyze one audio sample. Never fails: any decode or analysis error
    /// produces a degraded mapping and the caller proceeds with defaults.
    pub fn extract(&self, audio: &Path) -> Biomarkers {
        match analyze_file(audio) {
            Ok(biomarkers) => biomarkers,
            Err(e) => {
                tracing::warn!(
                    path = %audio.display(),
                    error = %e,
                    "Vocal analysis failed, using degraded biomarkers"
                );
                Biomarkers::degraded(e.to_string())
            }
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

fn analyze_file(path: &Path) -> Result<Biomarkers, VocalError> {
    let (samples, sample_rate) = read_mono_samples(path)?;
    Ok(analyze_samples(&samples, sample_rate))
}

/// Decode a WAV file to normalized mono samples in [-1, 1].
fn read_mono_samples(path: &Path) -> Result<(Vec<f64>, u32), VocalError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let raw: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<f64> = if channels == 1 {
        raw
    } else {
        raw.chunks(channels)
            .map(|frame| frame.iter().sum::<f64>() / frame.len() as f64)
            .collect()
    };

    if mono.is_empty() {
        return Err(VocalError::Empty);
    }

    Ok((mono, spec.sample_rate))
}

fn analyze_samples(samples: &[f64], sample_rate: u32) -> Biomarkers {
    let frame_len = (sample_rate as usize * FRAME_MS / 1000).max(1);
    let hop = (sample_rate as usize * HOP_MS / 1000).max(1);

    let mut rms_values = Vec::new();
    // (frame index, pitch period in seconds, peak amplitude) per voiced frame
    let mut voiced: Vec<(usize, f64, f64)> = Vec::new();

    let mut index = 0usize;
    let mut start = 0usize;
    while start + frame_len <= samples.len() {
        let frame = &samples[start..start + frame_len];
        let rms = frame_rms(frame);
        rms_values.push(rms);

        if rms >= SILENCE_RMS_FLOOR {
            if let Some(period) = detect_period(frame, sample_rate) {
                let peak = frame.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
                voiced.push((index, period, peak));
            }
        }

        index += 1;
        start += hop;
    }

    let duration_secs = samples.len() as f64 / sample_rate as f64;

    let f0_values: Vec<f64> = voiced.iter().map(|(_, period, _)| 1.0 / period).collect();
    let periods: Vec<f64> = voiced.iter().map(|(_, period, _)| *period).collect();
    let peaks: Vec<f64> = voiced.iter().map(|(_, _, peak)| *peak).collect();

    let loudness_mean = mean(&rms_values);
    let loudness_stddev = if loudness_mean > 0.0 {
        stddev(&rms_values) / loudness_mean
    } else {
        0.0
    };

    let jitter = finite_or_zero(relative_consecutive_delta(&periods));
    let shimmer = finite_or_zero(relative_consecutive_delta(&peaks));

    let speaking_rate = if duration_secs > 0.0 {
        count_onsets(&voiced) as f64 / duration_secs
    } else {
        0.0
    };

    let mut values = BTreeMap::new();
    values.insert(F0_MEAN.to_string(), finite_or_zero(mean(&f0_values)));
    values.insert(F0_STDDEV.to_string(), finite_or_zero(stddev(&f0_values)));
    values.insert(JITTER_LOCAL.to_string(), jitter);
    values.insert(SHIMMER_LOCAL.to_string(), shimmer);
    values.insert(LOUDNESS_MEAN.to_string(), finite_or_zero(loudness_mean));
    values.insert(LOUDNESS_STDDEV.to_string(), finite_or_zero(loudness_stddev));
    values.insert(SPEAKING_RATE.to_string(), finite_or_zero(speaking_rate));
    values.insert(
        VOCAL_STABILITY_SCORE.to_string(),
        finite_or_zero(1.0 - jitter),
    );

    Biomarkers {
        values,
        error: None,
    }
}

/// Pitch period for one frame, or `None` when the frame is unvoiced.
///
/// Scans lags in the pitch band and picks the first local autocorrelation
/// peak above the voicing threshold, which avoids octave doubling on
/// strongly periodic frames.
fn detect_period(frame: &[f64], sample_rate: u32) -> Option<f64> {
    let min_lag = ((sample_rate as f64 / MAX_PITCH_HZ) as usize).max(1);
    let max_lag =
        ((sample_rate as f64 / MIN_PITCH_HZ) as usize).min(frame.len().saturating_sub(1));
    if min_lag >= max_lag {
        return None;
    }

    let corrs: Vec<f64> = (min_lag..=max_lag)
        .map(|lag| normalized_corr(frame, lag))
        .collect();

    for i in 0..corrs.len() {
        let c = corrs[i];
        if c < VOICING_CORR_THRESHOLD {
            continue;
        }
        let rising = i == 0 || corrs[i - 1] <= c;
        let falling = i + 1 == corrs.len() || corrs[i + 1] <= c;
        if rising && falling {
            let lag = min_lag + i;
            return Some(lag as f64 / sample_rate as f64);
        }
    }

    None
}

fn normalized_corr(frame: &[f64], lag: usize) -> f64 {
    let n = frame.len() - lag;
    let mut cross = 0.0;
    let mut energy_a = 0.0;
    let mut energy_b = 0.0;
    for i in 0..n {
        cross += frame[i] * frame[i + lag];
        energy_a += frame[i] * frame[i];
        energy_b += frame[i + lag] * frame[i + lag];
    }

    let denom = (energy_a * energy_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cross / denom
    }
}

fn frame_rms(frame: &[f64]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64).sqrt()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean absolute consecutive delta over the series mean (the jitter and
/// shimmer shape). Zero for fewer than two points or a zero mean.
fn relative_consecutive_delta(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    let delta_sum: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    delta_sum / (values.len() - 1) as f64 / m
}

/// Voiced-segment onsets: runs of voiced frames separated by a gap.
fn count_onsets(voiced: &[(usize, f64, f64)]) -> usize {
    if voiced.is_empty() {
        return 0;
    }
    let mut onsets = 1;
    for pair in voiced.windows(2) {
        if pair[1].0 > pair[0].0 + 1 {
            onsets += 1;
        }
    }
    onsets
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, secs: f64, sample_rate: u32, amplitude: f64) -> Vec<f64> {
        let n = (secs * sample_rate as f64) as usize;
        (0..n)
            .map(|i| {
                amplitude
                    * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin()
            })
            .collect()
    }

    fn write_wav(path: &Path, samples: &[f64], channels: u16, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create wav");
        for s in samples {
            writer
                .write_sample((s * i16::MAX as f64) as i16)
                .expect("Failed to write sample");
        }
        writer.finalize().expect("Failed to finalize wav");
    }

    // TEST 1: A steady 220 Hz tone is tracked near 220 Hz
    #[test]
    fn test_pure_tone_pitch_is_tracked() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("tone.wav");
        write_wav(&path, &sine(220.0, 1.0, 16000, 0.8), 1, 16000);

        let biomarkers = BiomarkerExtractor::new().extract(&path);

        assert!(!biomarkers.is_degraded());
        let f0 = biomarkers.get(F0_MEAN);
        assert!(
            (210.0..=230.0).contains(&f0),
            "Expected f0 near 220 Hz, got {f0}"
        );
        assert!(biomarkers.loudness_mean() > 0.1);
        assert!(biomarkers.get(SPEAKING_RATE) > 0.0);
    }

    // TEST 2: A pure tone has near-zero jitter and stability = 1 - jitter
    #[test]
    fn test_pure_tone_is_stable() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("tone.wav");
        write_wav(&path, &sine(220.0, 1.0, 16000, 0.8), 1, 16000);

        let biomarkers = BiomarkerExtractor::new().extract(&path);

        let jitter = biomarkers.jitter_local();
        let stability = biomarkers.get(VOCAL_STABILITY_SCORE);
        assert!(jitter < 0.05, "Expected near-zero jitter, got {jitter}");
        assert!(
            (stability + jitter - 1.0).abs() < 1e-9,
            "Stability must be 1 - jitter"
        );
    }

    // TEST 3: Silence yields finite, zeroed pitch features without degrading
    #[test]
    fn test_silence_yields_finite_features() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("silence.wav");
        write_wav(&path, &vec![0.0; 16000], 1, 16000);

        let biomarkers = BiomarkerExtractor::new().extract(&path);

        assert!(!biomarkers.is_degraded());
        assert_eq!(biomarkers.get(F0_MEAN), 0.0);
        assert_eq!(biomarkers.jitter_local(), 0.0);
        for feature in [
            F0_MEAN,
            F0_STDDEV,
            JITTER_LOCAL,
            SHIMMER_LOCAL,
            LOUDNESS_MEAN,
            LOUDNESS_STDDEV,
            SPEAKING_RATE,
            VOCAL_STABILITY_SCORE,
        ] {
            assert!(biomarkers.get(feature).is_finite());
        }
    }

    // TEST 4: A missing file degrades instead of failing
    #[test]
    fn test_missing_file_degrades() {
        let biomarkers =
            BiomarkerExtractor::new().extract(Path::new("/nonexistent/missing.wav"));

        assert!(biomarkers.is_degraded());
        assert!(biomarkers.error().is_some());
        assert_eq!(biomarkers.get(F0_MEAN), 0.0);
        assert_eq!(biomarkers.jitter_local(), 0.0);
        assert_eq!(biomarkers.loudness_mean(), 0.0);
    }

    // TEST 5: Stereo input is downmixed and analyzed
    #[test]
    fn test_stereo_input_is_downmixed() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("stereo.wav");
        let mono = sine(220.0, 0.5, 16000, 0.8);
        let interleaved: Vec<f64> = mono.iter().flat_map(|s| [*s, *s]).collect();
        write_wav(&path, &interleaved, 2, 16000);

        let biomarkers = BiomarkerExtractor::new().extract(&path);

        assert!(!biomarkers.is_degraded());
        assert!(biomarkers.loudness_mean() > 0.1);
        let f0 = biomarkers.get(F0_MEAN);
        assert!((210.0..=230.0).contains(&f0), "Got f0 {f0}");
    }

    // TEST 6: NaN and infinite values normalize to zero
    #[test]
    fn test_finite_or_zero_normalizes() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(1.5), 1.5);
    }

    // TEST 7: Consecutive-delta helper behaves at the edges
    #[test]
    fn test_relative_consecutive_delta() {
        assert_eq!(relative_consecutive_delta(&[]), 0.0);
        assert_eq!(relative_consecutive_delta(&[1.0]), 0.0);
        assert_eq!(relative_consecutive_delta(&[2.0, 2.0, 2.0]), 0.0);
        assert!(relative_consecutive_delta(&[1.0, 2.0, 1.0]) > 0.0);
    }

    // TEST 8: JSON rendering carries the error field only when degraded
    #[test]
    fn test_to_json_error_field() {
        let ok = Biomarkers::default();
        assert!(ok.to_json().get("error").is_none());

        let degraded = Biomarkers::degraded("decode failed");
        let json = degraded.to_json();
        assert_eq!(json["error"], "decode failed");
        assert_eq!(json["f0_mean"], 0.0);
    }
}
