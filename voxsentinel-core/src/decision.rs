//! Verdict policy over a two-class probability pair.

use crate::config::ConfidenceFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary classification outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Genuine,
    Spoofed,
}

impl Verdict {
    /// Machine-stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Genuine => "genuine",
            Verdict::Spoofed => "spoofed",
        }
    }

    /// Capitalized label used in confidence breakdowns.
    pub fn display_name(&self) -> &'static str {
        match self {
            Verdict::Genuine => "Genuine",
            Verdict::Spoofed => "Spoofed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Verdict::Genuine => Severity::Info,
            Verdict::Spoofed => Severity::Warning,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locale-independent presentation tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// Verdict for a probability pair. Ties go to [`Verdict::Spoofed`].
pub fn decide(prob_genuine: f32, prob_spoofed: f32) -> Verdict {
    if prob_genuine > prob_spoofed {
        Verdict::Genuine
    } else {
        Verdict::Spoofed
    }
}

/// Verdict plus the presentation fields derived from it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub severity: Severity,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DecisionPolicy {
    format: ConfidenceFormat,
}

impl DecisionPolicy {
    pub fn new(format: ConfidenceFormat) -> Self {
        Self { format }
    }

    pub fn decide(&self, prob_genuine: f32, prob_spoofed: f32) -> Decision {
        let verdict = decide(prob_genuine, prob_spoofed);
        let winning = match verdict {
            Verdict::Genuine => prob_genuine,
            Verdict::Spoofed => prob_spoofed,
        };

        let confidence = match self.format {
            ConfidenceFormat::Fraction => winning,
            ConfidenceFormat::Percent => (winning * 100.0).round(),
        };

        Decision {
            verdict,
            severity: verdict.severity(),
            confidence,
        }
    }
}
