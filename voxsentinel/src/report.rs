//! Per-file result rendering.
//!
//! Formats classification results as plain text lines or a JSON array.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use voxsentinel_core::decision::{Severity, Verdict};
use voxsentinel_core::types::{ClassificationResult, ScoreSource};

/// Outcome of analyzing one input file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileReport {
    pub path: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Analyzed(AnalyzedReport),
    Failed { error: String },
}

/// Serialized view of a classification result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyzedReport {
    pub result: Verdict,
    pub severity: Severity,
    pub confidence: f32,
    pub confidence_breakdown: BTreeMap<&'static str, f32>,
    pub source: ScoreSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn analyzed(path: &Path, result: ClassificationResult) -> Self {
        Self {
            path: path.display().to_string(),
            outcome: Outcome::Analyzed(AnalyzedReport {
                confidence_breakdown: result.confidence_breakdown(),
                result: result.verdict,
                severity: result.severity,
                confidence: result.confidence,
                source: result.source,
                error: result.error,
            }),
        }
    }

    pub fn failed(path: &Path, error: &eyre::Report) -> Self {
        Self {
            path: path.display().to_string(),
            outcome: Outcome::Failed {
                error: format!("{error:#}"),
            },
        }
    }

    /// True when the file was rejected before a result could be produced.
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// One human-readable line per file.
pub fn to_line(report: &FileReport) -> String {
    match &report.outcome {
        Outcome::Analyzed(r) => {
            let probability = |verdict: Verdict| {
                r.confidence_breakdown
                    .get(verdict.display_name())
                    .copied()
                    .unwrap_or_default()
            };

            let mut line = format!(
                "{}: {} (confidence {}, genuine {:.3}, spoofed {:.3}, {})",
                report.path,
                r.result.display_name(),
                format_confidence(r.confidence),
                probability(Verdict::Genuine),
                probability(Verdict::Spoofed),
                source_label(r.source),
            );
            if let Some(error) = &r.error {
                line.push_str(&format!(" [error: {error}]"));
            }
            line
        }
        Outcome::Failed { error } => format!("{}: rejected: {error}", report.path),
    }
}

/// Pretty-printed JSON array of reports.
pub fn to_json(reports: &[FileReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

/// Fractions print with two decimals, percentages as whole numbers.
fn format_confidence(confidence: f32) -> String {
    if confidence > 1.0 {
        format!("{confidence:.0}%")
    } else {
        format!("{confidence:.2}")
    }
}

fn source_label(source: ScoreSource) -> &'static str {
    match source {
        ScoreSource::Model => "model",
        ScoreSource::Fallback => "fallback",
        ScoreSource::Degraded => "degraded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(genuine: f32, source: ScoreSource) -> ClassificationResult {
        let verdict = voxsentinel_core::decision::decide(genuine, 1.0 - genuine);
        ClassificationResult {
            probability_genuine: genuine,
            probability_spoofed: 1.0 - genuine,
            verdict,
            severity: verdict.severity(),
            confidence: genuine.max(1.0 - genuine),
            source,
            error: None,
        }
    }

    #[test]
    fn formats_analyzed_line() {
        let report = FileReport::analyzed(Path::new("a.wav"), result(0.75, ScoreSource::Model));

        let line = to_line(&report);

        assert!(line.starts_with("a.wav: Genuine"));
        assert!(line.contains("confidence 0.75"));
        assert!(line.contains("model"));
    }

    #[test]
    fn formats_percent_confidence() {
        assert_eq!(format_confidence(83.0), "83%");
        assert_eq!(format_confidence(0.5), "0.50");
    }

    #[test]
    fn formats_failed_line() {
        let report = FileReport::failed(Path::new("b.wav"), &eyre::eyre!("audio is empty"));

        assert!(report.is_failure());
        assert_eq!(to_line(&report), "b.wav: rejected: audio is empty");
    }

    #[test]
    fn json_carries_breakdown_and_verdict() {
        let reports = vec![
            FileReport::analyzed(Path::new("a.wav"), result(0.2, ScoreSource::Fallback)),
            FileReport::failed(Path::new("b.wav"), &eyre::eyre!("bad header")),
        ];

        let json: serde_json::Value = serde_json::from_str(&to_json(&reports).unwrap()).unwrap();

        assert_eq!(json[0]["path"], "a.wav");
        assert_eq!(json[0]["result"], "spoofed");
        assert_eq!(json[0]["severity"], "warning");
        assert_eq!(json[0]["source"], "fallback");
        assert!(json[0]["confidence_breakdown"]["Genuine"].is_number());
        assert!(json[0]["confidence_breakdown"]["Spoofed"].is_number());
        assert!(json[0].get("error").is_none());
        assert_eq!(json[1]["error"], "bad header");
    }
}
