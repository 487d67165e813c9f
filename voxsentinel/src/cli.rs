//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use eyre::Result;
use voxsentinel_core::config::{FeatureKind, LabelOrder};

#[derive(Debug, Parser)]
#[command(name = "vsent")]
#[command(about = "Voice spoofing detection tools")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify WAV files as genuine or spoofed speech
    Analyze(crate::analyze::Args),

    /// Write a silent or sine-wave WAV file for testing
    Gen(crate::generate::Args),
}

/// Feature representation selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FeatureArg {
    /// 40 MFCCs x 94 frames
    Mfcc,
    /// 128 mel bands x 501 frames
    Mel,
}

impl From<FeatureArg> for FeatureKind {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Mfcc => FeatureKind::Mfcc,
            FeatureArg::Mel => FeatureKind::MelSpectrogram,
        }
    }
}

/// Class index convention of the loaded model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LabelOrderArg {
    /// Output index 0 is genuine
    GenuineFirst,
    /// Output index 0 is spoofed
    SpoofedFirst,
}

impl From<LabelOrderArg> for LabelOrder {
    fn from(arg: LabelOrderArg) -> Self {
        match arg {
            LabelOrderArg::GenuineFirst => LabelOrder::GENUINE_FIRST,
            LabelOrderArg::SpoofedFirst => LabelOrder::SPOOFED_FIRST,
        }
    }
}

/// Execute CLI command - separated for testing.
pub fn run(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Analyze(args) => crate::analyze::execute(args.try_into()?),
        Commands::Gen(args) => crate::generate::execute(args.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_analyze_command() {
        let cli = Cli::parse_from([
            "vsent",
            "analyze",
            "a.wav",
            "b.wav",
            "--label-order",
            "genuine-first",
        ]);

        match &cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.paths, [Path::new("a.wav"), Path::new("b.wav")]);
                assert_eq!(args.label_order, Some(LabelOrderArg::GenuineFirst));
                assert_eq!(args.features, None);
                assert!(args.model.is_none());
                assert!(!args.json);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_analyze_with_model_and_features() {
        let cli = Cli::parse_from([
            "vsent",
            "analyze",
            "voice.wav",
            "-m",
            "model.onnx",
            "--features",
            "mel",
            "--label-order",
            "spoofed-first",
            "--percent",
            "--json",
        ]);

        match &cli.command {
            Commands::Analyze(args) => {
                assert_eq!(args.model.as_deref(), Some(Path::new("model.onnx")));
                assert_eq!(args.features, Some(FeatureArg::Mel));
                assert_eq!(args.label_order, Some(LabelOrderArg::SpoofedFirst));
                assert!(args.percent);
                assert!(args.json);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn analyze_requires_a_path() {
        assert!(Cli::try_parse_from(["vsent", "analyze"]).is_err());
    }

    #[test]
    fn parses_gen_command() {
        let cli = Cli::parse_from(["vsent", "gen", "out.wav"]);

        match &cli.command {
            Commands::Gen(args) => {
                assert_eq!(args.output, Path::new("out.wav"));
                assert!((args.duration - 5.0).abs() < 0.001);
                assert_eq!(args.sample_rate, 44100);
                assert!(!args.sine);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn parses_gen_sine() {
        let cli = Cli::parse_from([
            "vsent",
            "gen",
            "tone.wav",
            "--sine",
            "--duration",
            "3",
            "--sample-rate",
            "16000",
        ]);

        match &cli.command {
            Commands::Gen(args) => {
                assert!(args.sine);
                assert!((args.duration - 3.0).abs() < 0.001);
                assert_eq!(args.sample_rate, 16000);
            }
            _ => panic!("unexpected command: {:?}", cli.command),
        }
    }

    #[test]
    fn label_order_args_map_to_constants() {
        assert_eq!(
            LabelOrder::from(LabelOrderArg::GenuineFirst),
            LabelOrder::GENUINE_FIRST
        );
        assert_eq!(
            LabelOrder::from(LabelOrderArg::SpoofedFirst),
            LabelOrder::SPOOFED_FIRST
        );
    }
}
