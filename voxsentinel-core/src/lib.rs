//! voxsentinel-core: audio-to-verdict pipeline for voice spoofing detection.
//!
//! A clip flows through four stages, each usable on its own:
//!
//! - [`normalize::SignalNormalizer`]: resamples, optionally trims silence and
//!   forces a fixed duration
//! - [`features::FeatureExtractor`]: MFCC or mel-spectrogram tensor of a fixed
//!   `(1, bands, frames, 1)` shape
//! - [`classifier::ClassifierAdapter`]: runs a [`traits::Classifier`] held by a
//!   shared [`classifier::ClassifierHandle`], or draws fallback scores when no
//!   model is bound
//! - [`decision::DecisionPolicy`]: turns the probability pair into a verdict
//!
//! [`pipeline::SpoofDetector`] wires them together.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voxsentinel_core::audio::AudioClip;
//! use voxsentinel_core::classifier::ClassifierHandle;
//! use voxsentinel_core::config::{LabelOrder, PipelineConfig};
//! use voxsentinel_core::pipeline::SpoofDetector;
//!
//! let handle = Arc::new(ClassifierHandle::onnx("model.onnx"));
//! let config = PipelineConfig::mfcc(LabelOrder::GENUINE_FIRST);
//! let detector = SpoofDetector::new(config, handle)?;
//!
//! let clip = AudioClip::from_file("voice.wav")?;
//! let result = detector.analyze(&clip)?;
//! println!("{} ({:.2})", result.verdict, result.confidence);
//! ```

pub mod audio;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod error;
pub mod features;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod traits;
pub mod types;
