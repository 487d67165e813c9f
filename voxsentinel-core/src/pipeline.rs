//! End-to-end spoof detection pipeline.

use crate::audio::AudioClip;
use crate::classifier::{ClassifierAdapter, ClassifierHandle};
use crate::config::PipelineConfig;
use crate::decision::DecisionPolicy;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::normalize::SignalNormalizer;
use crate::types::{ClassificationResult, Probabilities};
use ndarray::Array4;
use std::sync::Arc;

/// Normalizer, extractor, classifier and decision policy wired for one configuration.
///
/// Holds no per-request state, so one detector can serve many threads.
#[derive(Clone, Debug)]
pub struct SpoofDetector {
    config: PipelineConfig,
    normalizer: SignalNormalizer,
    extractor: FeatureExtractor,
    classifier: ClassifierAdapter,
    policy: DecisionPolicy,
}

impl SpoofDetector {
    /// Build a detector around a shared classifier handle.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` fails validation.
    pub fn new(config: PipelineConfig, handle: Arc<ClassifierHandle>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            normalizer: SignalNormalizer::from_config(&config),
            extractor: FeatureExtractor::from_config(&config),
            classifier: ClassifierAdapter::from_config(handle, &config),
            policy: DecisionPolicy::new(config.confidence_format),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    /// Normalize and extract the feature tensor for one clip.
    pub fn preprocess(&self, samples: &[f32], sample_rate: u32) -> Result<Array4<f32>> {
        let audio = self.normalizer.normalize(samples, sample_rate)?;
        let features = self
            .extractor
            .extract(&audio, self.normalizer.target_rate())?;
        Ok(features)
    }

    /// Classify a decoded clip.
    pub fn analyze(&self, clip: &AudioClip) -> Result<ClassificationResult> {
        self.analyze_samples(&clip.samples, clip.sample_rate)
    }

    /// Classify raw mono samples.
    ///
    /// Once audio is accepted this always yields a result: an inference
    /// failure becomes an even split carrying the error message.
    ///
    /// # Errors
    ///
    /// Returns an empty-audio error when `samples` is empty.
    pub fn analyze_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<ClassificationResult> {
        let features = self.preprocess(samples, sample_rate)?;

        let (probs, error) = match self.classifier.classify(features) {
            Ok(probs) => (probs, None),
            Err(e) => {
                tracing::warn!(error = %e, "inference failed, reporting even split");
                (Probabilities::degenerate(), Some(e.to_string()))
            }
        };

        let decision = self.policy.decide(probs.genuine, probs.spoofed);

        tracing::debug!(
            verdict = %decision.verdict,
            genuine = probs.genuine,
            spoofed = probs.spoofed,
            source = ?probs.source,
            "classified clip"
        );

        Ok(ClassificationResult {
            probability_genuine: probs.genuine,
            probability_spoofed: probs.spoofed,
            verdict: decision.verdict,
            severity: decision.severity,
            confidence: decision.confidence,
            source: probs.source,
            error,
        })
    }
}
