//! Classifier model implementations.

pub mod onnx;

pub use onnx::OnnxClassifier;
