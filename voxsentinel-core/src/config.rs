//! Pipeline configuration, fixed per deployment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default target sample rate (16kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default clip duration in seconds
pub const DEFAULT_CLIP_DURATION: f32 = 5.0;

/// Default inference timeout in milliseconds
const DEFAULT_INFERENCE_TIMEOUT_MS: u64 = 10_000;

/// Spectral representation fed to the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Mel-frequency cepstral coefficients, min-max scaled to [0, 1]
    Mfcc,
    /// Mel power spectrogram in dB relative to the clip's peak
    MelSpectrogram,
}

/// Position of each class in the classifier's two-element output.
///
/// This is a property of the trained model and cannot be inferred from the
/// tensor shape, so there is deliberately no `Default`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 2]", into = "[usize; 2]")]
pub struct LabelOrder {
    genuine: usize,
    spoofed: usize,
}

impl LabelOrder {
    /// Index 0 = genuine, index 1 = spoofed.
    pub const GENUINE_FIRST: Self = Self {
        genuine: 0,
        spoofed: 1,
    };

    /// Index 0 = spoofed, index 1 = genuine.
    pub const SPOOFED_FIRST: Self = Self {
        genuine: 1,
        spoofed: 0,
    };

    /// Build a label order, rejecting anything that is not a permutation of [0, 1].
    pub fn new(genuine: usize, spoofed: usize) -> Result<Self, ConfigError> {
        match (genuine, spoofed) {
            (0, 1) | (1, 0) => Ok(Self { genuine, spoofed }),
            _ => Err(ConfigError::InvalidLabelOrder { genuine, spoofed }),
        }
    }

    pub fn genuine_index(&self) -> usize {
        self.genuine
    }

    pub fn spoofed_index(&self) -> usize {
        self.spoofed
    }
}

impl TryFrom<[usize; 2]> for LabelOrder {
    type Error = ConfigError;

    fn try_from([genuine, spoofed]: [usize; 2]) -> Result<Self, Self::Error> {
        Self::new(genuine, spoofed)
    }
}

impl From<LabelOrder> for [usize; 2] {
    fn from(order: LabelOrder) -> Self {
        [order.genuine, order.spoofed]
    }
}

/// Energy-based trimming of leading and trailing silence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilenceTrim {
    /// Frames quieter than this many dB below the loudest frame count as silence
    pub top_db: f32,
    /// RMS analysis window in samples
    pub frame_length: usize,
    /// Hop between RMS windows in samples
    pub hop_length: usize,
}

impl Default for SilenceTrim {
    fn default() -> Self {
        Self {
            top_db: 60.0,
            frame_length: 2048,
            hop_length: 512,
        }
    }
}

/// How the winning probability is reported to callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFormat {
    /// Fraction in [0, 1]
    #[default]
    Fraction,
    /// Rounded percentage in [0, 100]
    Percent,
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub target_sample_rate: u32,
    pub clip_duration_seconds: f32,
    pub feature_bands: usize,
    pub target_frames: usize,
    pub feature_kind: FeatureKind,
    pub label_order: LabelOrder,
    #[serde(default)]
    pub trim_silence: Option<SilenceTrim>,
    #[serde(default)]
    pub confidence_format: ConfidenceFormat,
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,
}

fn default_inference_timeout_ms() -> u64 {
    DEFAULT_INFERENCE_TIMEOUT_MS
}

impl PipelineConfig {
    /// 40 MFCCs x 94 frames over a 5s clip at 16kHz, no trimming.
    pub fn mfcc(label_order: LabelOrder) -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            clip_duration_seconds: DEFAULT_CLIP_DURATION,
            feature_bands: 40,
            target_frames: 94,
            feature_kind: FeatureKind::Mfcc,
            label_order,
            trim_silence: None,
            confidence_format: ConfidenceFormat::default(),
            inference_timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
        }
    }

    /// 128 mel bands x 501 frames over a 5s clip at 16kHz, silence trimmed.
    pub fn mel_spectrogram(label_order: LabelOrder) -> Self {
        Self {
            target_sample_rate: DEFAULT_SAMPLE_RATE,
            clip_duration_seconds: DEFAULT_CLIP_DURATION,
            feature_bands: 128,
            target_frames: 501,
            feature_kind: FeatureKind::MelSpectrogram,
            label_order,
            trim_silence: Some(SilenceTrim::default()),
            confidence_format: ConfidenceFormat::default(),
            inference_timeout_ms: DEFAULT_INFERENCE_TIMEOUT_MS,
        }
    }

    /// Preset for the given feature kind.
    pub fn preset(kind: FeatureKind, label_order: LabelOrder) -> Self {
        match kind {
            FeatureKind::Mfcc => Self::mfcc(label_order),
            FeatureKind::MelSpectrogram => Self::mel_spectrogram(label_order),
        }
    }

    /// Number of samples in a normalized clip.
    pub fn clip_samples(&self) -> usize {
        (self.target_sample_rate as f64 * self.clip_duration_seconds as f64).round() as usize
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// Check every option for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |ok: bool, name| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::NonPositive { name })
            }
        };

        positive(self.target_sample_rate > 0, "target_sample_rate")?;
        positive(
            self.clip_duration_seconds.is_finite() && self.clip_duration_seconds > 0.0,
            "clip_duration_seconds",
        )?;
        positive(self.clip_samples() > 0, "clip_samples")?;
        positive(self.feature_bands > 0, "feature_bands")?;
        positive(self.target_frames > 0, "target_frames")?;
        positive(self.inference_timeout_ms > 0, "inference_timeout_ms")?;

        if let Some(trim) = &self.trim_silence {
            positive(trim.top_db.is_finite() && trim.top_db > 0.0, "trim_silence.top_db")?;
            positive(trim.frame_length > 0, "trim_silence.frame_length")?;
            positive(trim.hop_length > 0, "trim_silence.hop_length")?;
        }

        if self.feature_kind == FeatureKind::Mfcc
            && self.feature_bands > crate::features::MFCC_MEL_FILTERS
        {
            return Err(ConfigError::TooManyCoefficients {
                bands: self.feature_bands,
                mels: crate::features::MFCC_MEL_FILTERS,
            });
        }

        // Re-check in case the struct was assembled by hand.
        LabelOrder::new(self.label_order.genuine, self.label_order.spoofed)?;

        Ok(())
    }
}
