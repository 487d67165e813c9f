//! ONNX Runtime classifier.

use crate::error::ModelError;
use crate::traits::Classifier;
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::{inputs, value::Tensor};
use std::path::Path;

/// Binary classifier backed by an ONNX model with one input and one output.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Wrap a session, taking its first input and first output as the I/O pair.
    pub fn new(session: Session) -> Result<Self, ModelError> {
        let input_name = session
            .inputs
            .first()
            .ok_or(ModelError::MissingTensor { kind: "input" })?
            .name
            .clone();

        let output_name = session
            .outputs
            .first()
            .ok_or(ModelError::MissingTensor { kind: "output" })?
            .name
            .clone();

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    /// Load a model file with the given session builder.
    pub fn from_file(path: impl AsRef<Path>, builder: SessionBuilder) -> Result<Self, ModelError> {
        let path = path.as_ref();

        tracing::info!(path = ?path.display(), "loading classifier");

        let session = builder.commit_from_file(path)?;
        let classifier = Self::new(session)?;

        tracing::debug!(
            input = %classifier.input_name,
            output = %classifier.output_name,
            "classifier loaded"
        );

        Ok(classifier)
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let input = Tensor::from_array(features)?;

        let mut outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input])?;

        let scores = outputs
            .remove(self.output_name.as_str())
            .ok_or_else(|| ModelError::MissingOutput {
                name: self.output_name.clone(),
            })?;

        let scores = scores.try_extract_array::<f32>()?;

        tracing::trace!(shape = ?scores.shape(), "classifier output");

        Ok(scores.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires a two-class ONNX model at VS_TEST_MODEL"]
    fn predicts_two_scores() {
        let path = std::env::var("VS_TEST_MODEL").expect("VS_TEST_MODEL not set");

        let mut classifier = OnnxClassifier::from_file(&path, Session::builder().unwrap())
            .expect("failed to load model");

        let scores = classifier
            .predict(Array4::zeros((1, 40, 94, 1)))
            .expect("inference failed");

        assert_eq!(scores.len(), 2);
    }
}
