//! Audio loading and per-frame feature extraction.
//!
//! Two feature modes exist, selected by the model architecture: 26-dim MFCC
//! and 161-dim magnitude spectrogram. Both use a 20ms window with a 10ms hop
//! over 16kHz mono audio.

use crate::corpus::Utterance;
use crate::error::{AudioError, Result};
use crate::model::Arch;
use hound::{SampleFormat, WavReader};
use ndarray::Array2;
use std::f32::consts::PI;
use std::path::Path;

/// Expected sample rate for all corpora (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Analysis window length in samples (20ms)
pub const WIN_LENGTH: usize = 320;

/// Hop between adjacent frames in samples (10ms)
pub const HOP_LENGTH: usize = 160;

/// Preemphasis coefficient applied before the STFT.
const PREEMPHASIS: f32 = 0.97;

/// Mel filter count for MFCC extraction.
const N_MELS: usize = 26;

/// Per-frame feature layout required by a model architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureMode {
    /// 26 mel-frequency cepstral coefficients per frame
    Mfcc,
    /// 161 magnitude spectrogram bins per frame (320-point FFT)
    Spectrogram,
}

impl FeatureMode {
    /// Feature dimension per frame.
    pub fn dim(self) -> usize {
        match self {
            FeatureMode::Mfcc => 26,
            FeatureMode::Spectrogram => 161,
        }
    }

    /// Feature mode implied by an architecture identifier.
    ///
    /// The same mapping serves the training and evaluation paths of a run,
    /// so the two generator instances cannot disagree.
    pub fn for_arch(arch: Arch) -> Self {
        match arch.id() {
            2 | 5 => FeatureMode::Spectrogram,
            _ => FeatureMode::Mfcc,
        }
    }
}

impl std::fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureMode::Mfcc => write!(f, "mfcc"),
            FeatureMode::Spectrogram => write!(f, "spectrogram"),
        }
    }
}

/// Number of frames extraction yields for a sample count.
pub fn frame_count(samples: usize) -> usize {
    if samples < WIN_LENGTH {
        0
    } else {
        (samples - WIN_LENGTH) / HOP_LENGTH + 1
    }
}

/// Source of per-frame features for an utterance.
///
/// The production source reads WAV files; tests substitute synthetic
/// features to avoid audio fixtures.
pub trait FeatureSource {
    fn features(&self, utterance: &Utterance, mode: FeatureMode) -> Result<Array2<f32>>;
}

/// Feature source backed by the utterance's WAV file.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavFeatureSource;

impl FeatureSource for WavFeatureSource {
    fn features(&self, utterance: &Utterance, mode: FeatureMode) -> Result<Array2<f32>> {
        let audio = read_audio_mono(&utterance.wav_path)?;
        Ok(extract_features(&audio, mode))
    }
}

/// Read a WAV file as mono f32 samples.
///
/// The corpus format is fixed at 16kHz; any other rate is rejected rather
/// than resampled. Stereo is averaged down to one channel.
pub fn read_audio_mono(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(AudioError::InvalidSampleRate {
            expected: SAMPLE_RATE,
            got: spec.sample_rate,
        }
        .into());
    }

    if spec.channels == 0 || spec.channels > 2 {
        return Err(AudioError::InvalidChannels(spec.channels).into());
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / f32::from(i16::MAX)))
            .collect::<hound::Result<_>>()?,
    };

    if spec.channels == 2 {
        return Ok(samples
            .chunks(2)
            .map(|pair| pair.iter().sum::<f32>() / 2.0)
            .collect());
    }

    Ok(samples)
}

/// Extract per-frame features from audio samples.
///
/// Returns a 2D array of shape (frames, mode.dim()). Audio shorter than one
/// window yields zero frames.
pub fn extract_features(audio: &[f32], mode: FeatureMode) -> Array2<f32> {
    if frame_count(audio.len()) == 0 {
        return Array2::zeros((0, mode.dim()));
    }

    let audio = apply_preemphasis(audio, PREEMPHASIS);

    let features = match mode {
        FeatureMode::Spectrogram => {
            // 320-point FFT keeps 161 bins, matching the feature dimension
            let spectrogram = stft(&audio, WIN_LENGTH, HOP_LENGTH, WIN_LENGTH);
            spectrogram.mapv(|x| (x.max(1e-10)).ln()).t().to_owned()
        }
        FeatureMode::Mfcc => {
            let spectrogram = stft(&audio, 512, HOP_LENGTH, WIN_LENGTH);
            let filterbank = create_mel_filterbank(512, N_MELS, SAMPLE_RATE as usize);
            let mel = filterbank.dot(&spectrogram);
            let log_mel = mel.mapv(|x| (x.max(1e-10)).ln());
            dct_rows(&log_mel.t().to_owned())
        }
    };

    normalize_per_dim(features)
}

/// Apply preemphasis filter to audio signal.
///
/// Enhances high frequencies by applying: `y[i] = x[i] - coef * x[i-1]`
fn apply_preemphasis(audio: &[f32], coef: f32) -> Vec<f32> {
    let mut result = Vec::with_capacity(audio.len());
    result.push(audio[0]);

    for i in 1..audio.len() {
        result.push(audio[i] - coef * audio[i - 1]);
    }

    result
}

/// Create Hann window for STFT.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (window_length as f32 - 1.0)).cos())
        .collect()
}

/// Compute Short-Time Fourier Transform (STFT) power spectrogram.
///
/// Returns an array of shape (n_fft / 2 + 1, frames).
fn stft(audio: &[f32], n_fft: usize, hop_length: usize, win_length: usize) -> Array2<f32> {
    use rustfft::{FftPlanner, num_complex::Complex};

    let window = hann_window(win_length);
    let num_frames = (audio.len() - win_length) / hop_length + 1;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];
        for i in 0..win_length.min(audio.len() - start) {
            frame[i] = Complex::new(audio[start + i] * window[i], 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            let magnitude = frame[k].norm();
            spectrogram[[k, frame_idx]] = magnitude * magnitude;
        }
    }

    spectrogram
}

/// Convert frequency in Hz to mel scale.
fn hz_to_mel(freq: f32) -> f32 {
    2595.0 * (1.0 + freq / 700.0).log10()
}

/// Convert mel scale to frequency in Hz.
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Create mel filterbank for converting STFT bins to mel energies.
fn create_mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: usize) -> Array2<f32> {
    let freq_bins = n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(0.0);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);

    let mel_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = sample_rate as f32 / n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;

            if freq >= left && freq <= center {
                filterbank[[mel_idx, freq_idx]] = (freq - left) / (center - left);
            } else if freq > center && freq <= right {
                filterbank[[mel_idx, freq_idx]] = (right - freq) / (right - center);
            }
        }
    }

    filterbank
}

/// Orthonormal DCT-II applied to each row, keeping every coefficient.
fn dct_rows(input: &Array2<f32>) -> Array2<f32> {
    let (frames, n) = (input.shape()[0], input.shape()[1]);
    let mut output = Array2::<f32>::zeros((frames, n));

    let scale0 = (1.0 / n as f32).sqrt();
    let scale = (2.0 / n as f32).sqrt();

    for t in 0..frames {
        for k in 0..n {
            let mut acc = 0.0;
            for i in 0..n {
                acc += input[[t, i]] * (PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n as f32)).cos();
            }
            output[[t, k]] = acc * if k == 0 { scale0 } else { scale };
        }
    }

    output
}

/// Normalize each feature dimension to mean=0, std=1.
fn normalize_per_dim(mut features: Array2<f32>) -> Array2<f32> {
    let num_frames = features.shape()[0];
    let num_features = features.shape()[1];

    for feat_idx in 0..num_features {
        let mut column = features.column_mut(feat_idx);
        let mean: f32 = column.iter().sum::<f32>() / num_frames as f32;
        let variance: f32 =
            column.iter().map(|&x| (x - mean).powi(2)).sum::<f32>() / num_frames as f32;
        let std = variance.sqrt().max(1e-10);

        for val in column.iter_mut() {
            *val = (*val - mean) / std;
        }
    }

    features
}
