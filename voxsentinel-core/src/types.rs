//! Core types for voxsentinel-core

use crate::decision::{Severity, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a probability pair came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Trained classifier output
    Model,
    /// Stochastic stand-in used when no classifier is bound
    Fallback,
    /// Fixed 0.5/0.5 substituted after an inference failure
    Degraded,
}

/// Two-class probability pair, always summing to one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Probabilities {
    pub genuine: f32,
    pub spoofed: f32,
    pub source: ScoreSource,
}

impl Probabilities {
    /// Scale a non-negative pair so it sums to one.
    ///
    /// Returns `None` if either value is negative or non-finite, or both are zero.
    pub fn normalized(genuine: f32, spoofed: f32, source: ScoreSource) -> Option<Self> {
        let valid = |p: f32| p.is_finite() && p >= 0.0;
        let total = genuine + spoofed;

        if !valid(genuine) || !valid(spoofed) || total <= 0.0 || !total.is_finite() {
            return None;
        }

        Some(Self {
            genuine: genuine / total,
            spoofed: spoofed / total,
            source,
        })
    }

    /// Even split reported when inference fails.
    pub fn degenerate() -> Self {
        Self {
            genuine: 0.5,
            spoofed: 0.5,
            source: ScoreSource::Degraded,
        }
    }
}

/// Final per-request record handed to persistence and rendering layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub probability_genuine: f32,
    pub probability_spoofed: f32,
    pub verdict: Verdict,
    pub severity: Severity,
    /// Winning probability in the deployment's confidence format
    pub confidence: f32,
    pub source: ScoreSource,
    /// Set when the probabilities are a substitute for a failed inference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Probabilities keyed by display label.
    pub fn confidence_breakdown(&self) -> BTreeMap<&'static str, f32> {
        BTreeMap::from([
            (Verdict::Genuine.display_name(), self.probability_genuine),
            (Verdict::Spoofed.display_name(), self.probability_spoofed),
        ])
    }

    pub fn is_degraded(&self) -> bool {
        self.source == ScoreSource::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_sums_to_one() {
        let probs = Probabilities::normalized(3.0, 1.0, ScoreSource::Model).unwrap();

        assert!((probs.genuine - 0.75).abs() < 1e-6);
        assert!((probs.genuine + probs.spoofed - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalized_rejects_invalid_pairs() {
        assert!(Probabilities::normalized(0.0, 0.0, ScoreSource::Model).is_none());
        assert!(Probabilities::normalized(-0.1, 1.1, ScoreSource::Model).is_none());
        assert!(Probabilities::normalized(f32::NAN, 0.5, ScoreSource::Model).is_none());
        assert!(Probabilities::normalized(f32::INFINITY, 0.5, ScoreSource::Model).is_none());
    }

    #[test]
    fn serializes_machine_stable_labels() {
        let result = ClassificationResult {
            probability_genuine: 0.2,
            probability_spoofed: 0.8,
            verdict: Verdict::Spoofed,
            severity: Severity::Warning,
            confidence: 0.8,
            source: ScoreSource::Fallback,
            error: None,
        };

        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["verdict"], "spoofed");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["source"], "fallback");
        assert!(json.get("error").is_none());

        let breakdown = result.confidence_breakdown();
        assert_eq!(breakdown["Genuine"], 0.2);
        assert_eq!(breakdown["Spoofed"], 0.8);
    }
}
