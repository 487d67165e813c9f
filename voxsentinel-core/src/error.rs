//! Error types for voxsentinel-core organized by processing stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::time::Duration;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Audio loading and normalization stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Feature extraction stage error
    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),

    /// Classifier inference stage error
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric option must be strictly positive
    #[error("invalid {name}: must be greater than zero")]
    NonPositive { name: &'static str },

    /// Label order is not a permutation of {0, 1}
    #[error("invalid label order [{genuine}, {spoofed}]: expected a permutation of [0, 1]")]
    InvalidLabelOrder { genuine: usize, spoofed: usize },

    /// More cepstral coefficients requested than mel filters available
    #[error("invalid mfcc band count: {bands} exceeds {mels} mel filters")]
    TooManyCoefficients { bands: usize, mels: usize },
}

/// Audio loading and normalization errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Input carried no samples before normalization
    #[error("empty audio: no samples to analyze")]
    Empty,

    /// Sample rate of zero
    #[error("invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Channel count validation failed
    #[error("invalid channel count: {0}")]
    InvalidChannels(u16),

    /// Resampler could not be built for the requested rates
    #[error(transparent)]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Resampler failed while processing
    #[error(transparent)]
    Resample(#[from] rubato::ResampleError),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Feature extraction errors.
///
/// Normalization always hands over a non-empty buffer, so these indicate a
/// broken invariant rather than bad user input.
#[derive(Debug, Error)]
pub enum PreprocessingError {
    /// Sample buffer was empty after normalization
    #[error("no samples left after normalization")]
    EmptySamples,

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// ndarray-stats min/max error
    #[error(transparent)]
    MinMax(#[from] MinMaxError),
}

/// Classifier runtime errors.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Model-level failure
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Inference did not finish in time
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    /// Classifier is still running an inference that already timed out
    #[error("classifier busy with a timed-out inference")]
    Busy,

    /// Inference worker exited without reporting a result
    #[error("inference worker panicked")]
    WorkerPanicked,

    /// A previous inference panicked while holding the classifier
    #[error("classifier lock poisoned")]
    Poisoned,

    /// Inference worker thread could not be started
    #[error("failed to spawn inference worker: {0}")]
    Spawn(std::io::Error),

    /// Output vector cannot be read as two class probabilities
    #[error("invalid classifier output: {0}")]
    InvalidOutput(String),
}

/// Model errors (ONNX, ndarray operations).
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model declares no input or output tensors
    #[error("model has no {kind} tensor")]
    MissingTensor { kind: &'static str },

    /// Missing expected output tensor
    #[error("missing model output: {name}")]
    MissingOutput { name: String },

    /// Output vector has the wrong number of classes
    #[error("expected {expected} class scores, got {got}")]
    OutputLength { expected: usize, got: usize },

    /// ONNX Runtime error
    #[error(transparent)]
    Ort(#[from] ort::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result type alias for voxsentinel-core operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// ModelError → InferenceError → Error
impl From<ModelError> for Error {
    fn from(e: ModelError) -> Self {
        Error::Inference(InferenceError::Model(e))
    }
}

// ort::Error → ModelError → InferenceError
impl From<ort::Error> for InferenceError {
    fn from(e: ort::Error) -> Self {
        InferenceError::Model(ModelError::Ort(e))
    }
}

// ShapeError → PreprocessingError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Preprocessing(PreprocessingError::Shape(e))
    }
}

// MinMaxError → PreprocessingError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Preprocessing(PreprocessingError::MinMax(e))
    }
}

impl Error {
    /// Whether this error rejects the request because the input held no audio.
    pub fn is_empty_audio(&self) -> bool {
        matches!(self, Error::Audio(AudioError::Empty))
    }
}
