//! Core traits for pipeline components.

use crate::error::ModelError;
use ndarray::Array4;

/// Binary classifier over a `(1, bands, frames, 1)` feature tensor.
///
/// Implementations return the raw class scores in the model's own index
/// order; mapping indices to labels is the adapter's job.
pub trait Classifier: Send {
    /// Run inference on one feature tensor.
    ///
    /// Note: Takes `&mut self` because ONNX Runtime's Session::run requires it.
    fn predict(&mut self, features: Array4<f32>) -> Result<Vec<f32>, ModelError>;
}
