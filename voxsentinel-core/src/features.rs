//! Spectral feature extraction.
//!
//! Both representations share one STFT and mel filterbank path and differ only
//! in the final stage: the MFCC variant applies a DCT and rescales to [0, 1],
//! the mel-spectrogram variant keeps peak-referenced dB values.

use crate::config::{FeatureKind, PipelineConfig};
use crate::error::PreprocessingError;
use ndarray::{Array2, Array4, Axis, s};
use ndarray_stats::QuantileExt;
use std::f32::consts::PI;

/// Mel filters computed before the DCT in the MFCC variant.
pub const MFCC_MEL_FILTERS: usize = 128;

/// Power floor used when converting to dB
const AMIN: f32 = 1e-10;

/// Dynamic range kept below the clip's peak, in dB
const TOP_DB: f32 = 80.0;

/// STFT and mel filterbank parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MelSpectrogram {
    pub n_mels: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
}

impl MelSpectrogram {
    /// Analysis used ahead of the DCT for MFCCs.
    pub const MFCC: Self = Self {
        n_mels: MFCC_MEL_FILTERS,
        n_fft: 2048,
        hop_length: 512,
        win_length: 2048,
    };

    /// Short-hop analysis for the mel-spectrogram variant (25ms window, 10ms hop at 16kHz).
    pub const fn short_hop(n_mels: usize) -> Self {
        Self {
            n_mels,
            n_fft: 512,
            hop_length: 160,
            win_length: 400,
        }
    }

    /// Number of frames produced for `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Mel power spectrogram in dB relative to its own peak, shape (n_mels, frames).
    pub fn log_mel(&self, audio: &[f32], sample_rate: u32) -> Array2<f32> {
        let spectrogram = stft(audio, self.n_fft, self.hop_length, self.win_length);
        let filterbank = create_mel_filterbank(self.n_fft, self.n_mels, sample_rate);
        power_to_db(filterbank.dot(&spectrogram))
    }
}

/// Cepstral coefficients over a log-mel spectrogram.
#[derive(Clone, Debug)]
pub struct Mfcc {
    pub n_mfcc: usize,
    pub mel: MelSpectrogram,
}

impl Mfcc {
    pub fn new(n_mfcc: usize) -> Self {
        Self {
            n_mfcc,
            mel: MelSpectrogram::MFCC,
        }
    }

    /// MFCC matrix, shape (n_mfcc, frames).
    pub fn apply(&self, audio: &[f32], sample_rate: u32) -> Array2<f32> {
        let log_mel = self.mel.log_mel(audio, sample_rate);
        dct_basis(self.n_mfcc, self.mel.n_mels).dot(&log_mel)
    }
}

/// Turns a normalized clip into the 4-axis tensor a classifier consumes.
#[derive(Clone, Debug)]
pub enum FeatureExtractor {
    /// MFCCs min-max scaled to [0, 1]
    Mfcc { mfcc: Mfcc, target_frames: usize },
    /// Mel spectrogram in dB
    MelSpectrogram {
        mel: MelSpectrogram,
        target_frames: usize,
    },
}

impl FeatureExtractor {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let target_frames = config.target_frames;
        match config.feature_kind {
            FeatureKind::Mfcc => Self::Mfcc {
                mfcc: Mfcc::new(config.feature_bands),
                target_frames,
            },
            FeatureKind::MelSpectrogram => Self::MelSpectrogram {
                mel: MelSpectrogram::short_hop(config.feature_bands),
                target_frames,
            },
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Self::Mfcc { .. } => FeatureKind::Mfcc,
            Self::MelSpectrogram { .. } => FeatureKind::MelSpectrogram,
        }
    }

    /// Output tensor shape `(1, bands, frames, 1)`.
    pub fn output_shape(&self) -> (usize, usize, usize, usize) {
        match self {
            Self::Mfcc {
                mfcc,
                target_frames,
            } => (1, mfcc.n_mfcc, *target_frames, 1),
            Self::MelSpectrogram {
                mel,
                target_frames,
            } => (1, mel.n_mels, *target_frames, 1),
        }
    }

    /// Extract features with a fixed `(1, bands, target_frames, 1)` shape.
    ///
    /// # Errors
    ///
    /// Returns [`PreprocessingError::EmptySamples`] for an empty buffer.
    pub fn extract(
        &self,
        audio: &[f32],
        sample_rate: u32,
    ) -> Result<Array4<f32>, PreprocessingError> {
        if audio.is_empty() {
            return Err(PreprocessingError::EmptySamples);
        }

        let features = match self {
            Self::Mfcc {
                mfcc,
                target_frames,
            } => {
                let features = fit_frames(mfcc.apply(audio, sample_rate), *target_frames);
                min_max_scale(features)?
            }
            Self::MelSpectrogram {
                mel,
                target_frames,
            } => fit_frames(mel.log_mel(audio, sample_rate), *target_frames),
        };

        tracing::debug!(kind = ?self.kind(), shape = ?features.shape(), "extracted features");

        Ok(features.insert_axis(Axis(0)).insert_axis(Axis(3)))
    }
}

/// Zero-pad or truncate the time axis to exactly `target_frames` columns.
pub fn fit_frames(features: Array2<f32>, target_frames: usize) -> Array2<f32> {
    let (bands, frames) = features.dim();

    if frames == target_frames {
        return features;
    }

    let mut fitted = Array2::<f32>::zeros((bands, target_frames));
    let keep = frames.min(target_frames);
    fitted
        .slice_mut(s![.., ..keep])
        .assign(&features.slice(s![.., ..keep]));

    fitted
}

/// Linearly rescale into [0, 1]; a constant matrix becomes all zeros.
pub fn min_max_scale(features: Array2<f32>) -> Result<Array2<f32>, PreprocessingError> {
    let min = *features.min()?;
    let max = *features.max()?;
    let range = max - min;

    if range > 0.0 {
        Ok(features.mapv(|x| (x - min) / range))
    } else {
        Ok(Array2::zeros(features.dim()))
    }
}

/// Periodic Hann window.
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Pad `n_fft / 2` samples on each side, reflecting when the clip is long enough.
fn center_pad(audio: &[f32], pad: usize) -> Vec<f32> {
    let mut padded = Vec::with_capacity(audio.len() + 2 * pad);

    if audio.len() > pad {
        padded.extend((1..=pad).rev().map(|i| audio[i]));
        padded.extend_from_slice(audio);
        padded.extend((1..=pad).map(|i| audio[audio.len() - 1 - i]));
    } else {
        padded.resize(pad, 0.0);
        padded.extend_from_slice(audio);
        padded.resize(audio.len() + 2 * pad, 0.0);
    }

    padded
}

/// Compute Short-Time Fourier Transform (STFT) power spectrogram.
///
/// Frames are centred, giving `1 + len / hop_length` columns.
fn stft(audio: &[f32], n_fft: usize, hop_length: usize, win_length: usize) -> Array2<f32> {
    use rustfft::{FftPlanner, num_complex::Complex};

    let window = hann_window(win_length);
    let win_offset = (n_fft - win_length) / 2;

    let padded = center_pad(audio, n_fft / 2);
    let num_frames = 1 + audio.len() / hop_length;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut frame: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); n_fft];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length + win_offset;

        frame.fill(Complex::new(0.0, 0.0));
        for (i, w) in window.iter().enumerate() {
            frame[win_offset + i] = Complex::new(padded[start + i] * w, 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            spectrogram[[k, frame_idx]] = frame[k].norm_sqr();
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

/// Create mel filterbank for converting STFT to mel spectrogram.
///
/// Each triangle is scaled by `2 / bandwidth` so filters have equal area.
fn create_mel_filterbank(n_fft: usize, n_mels: usize, sample_rate: u32) -> Array2<f32> {
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
        let norm = 2.0 / (right - left);

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;

            if freq >= left && freq <= center {
                filterbank[[mel_idx, freq_idx]] = norm * (freq - left) / (center - left);
            } else if freq > center && freq <= right {
                filterbank[[mel_idx, freq_idx]] = norm * (right - freq) / (right - center);
            }
        }
    }

    filterbank
}

/// Power to dB relative to the matrix peak, floored at `TOP_DB` below it.
///
/// An all-zero input maps to an all-zero output.
fn power_to_db(power: Array2<f32>) -> Array2<f32> {
    let peak = power.iter().copied().fold(AMIN, f32::max);
    let reference = 10.0 * peak.log10();

    power.mapv(|x| (10.0 * x.max(AMIN).log10() - reference).max(-TOP_DB))
}

/// Orthonormal DCT-II basis, shape (n_out, n_in).
fn dct_basis(n_out: usize, n_in: usize) -> Array2<f32> {
    let n = n_in as f32;
    Array2::from_shape_fn((n_out, n_in), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        scale * (PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n)).cos()
    })
}
