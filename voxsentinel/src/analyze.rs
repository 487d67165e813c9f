//! Analyze subcommand - classify WAV files as genuine or spoofed.

use crate::cli::{FeatureArg, LabelOrderArg};
use crate::report::{self, FileReport};
use eyre::{Context, Result, bail, eyre};
#[allow(unused_imports)]
use ort::execution_providers::*;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use voxsentinel_core::audio::AudioClip;
use voxsentinel_core::classifier::ClassifierHandle;
use voxsentinel_core::config::{ConfidenceFormat, FeatureKind, PipelineConfig, SilenceTrim};
use voxsentinel_core::pipeline::SpoofDetector;

/// CLI arguments for analysis.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// WAV files to analyze
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// ONNX classifier; without it scores come from the fallback distribution
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// JSON pipeline configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature representation (default: mfcc, or the config file's choice)
    #[arg(long, value_enum)]
    pub features: Option<FeatureArg>,

    /// Class index convention of the model; required unless set in the config file
    #[arg(long, value_enum)]
    pub label_order: Option<LabelOrderArg>,

    /// Trim leading and trailing silence quieter than this many dB below the peak
    #[arg(long, value_name = "DB")]
    pub trim_db: Option<f32>,

    /// Report confidence as a rounded percentage
    #[arg(long)]
    pub percent: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Resolved configuration for analysis.
#[derive(Debug)]
pub struct Config {
    pub paths: Vec<PathBuf>,
    pub model: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub json: bool,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let mut pipeline = match &args.config {
            Some(path) => read_pipeline_config(path)?,
            None => {
                let label_order = args.label_order.ok_or_else(|| {
                    eyre!("the model's label order must be given with --label-order or --config")
                })?;
                let kind = args.features.map_or(FeatureKind::Mfcc, FeatureKind::from);
                PipelineConfig::preset(kind, label_order.into())
            }
        };

        if args.config.is_some() {
            if let Some(label_order) = args.label_order {
                pipeline.label_order = label_order.into();
            }
            if let Some(features) = args.features {
                let preset = PipelineConfig::preset(features.into(), pipeline.label_order);
                pipeline.feature_kind = preset.feature_kind;
                pipeline.feature_bands = preset.feature_bands;
                pipeline.target_frames = preset.target_frames;
            }
        }

        if let Some(top_db) = args.trim_db {
            pipeline.trim_silence = Some(SilenceTrim {
                top_db,
                ..SilenceTrim::default()
            });
        }

        if args.percent {
            pipeline.confidence_format = ConfidenceFormat::Percent;
        }

        pipeline
            .validate()
            .wrap_err("invalid pipeline configuration")?;

        Ok(Self {
            paths: args.paths,
            model: args.model,
            pipeline,
            json: args.json,
        })
    }
}

fn read_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config: {:?}", path.display()))?;

    serde_json::from_str(&text)
        .wrap_err_with(|| format!("failed to parse config: {:?}", path.display()))
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        files = config.paths.len(),
        features = ?config.pipeline.feature_kind,
        "analyzing"
    );

    let handle = Arc::new(match &config.model {
        Some(path) => ClassifierHandle::onnx_with(path, session_builder),
        None => ClassifierHandle::absent(),
    });

    let detector = SpoofDetector::new(config.pipeline, handle)?;

    let s = Instant::now();

    let reports = analyze_files(&detector, &config.paths);

    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "analysis completed");

    if config.json {
        println!("{}", report::to_json(&reports)?);
    } else {
        for line in reports.iter().map(report::to_line) {
            println!("{line}");
        }
    }

    let failed = reports.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        bail!("{failed} of {} files could not be analyzed", reports.len());
    }

    Ok(())
}

/// Analyze files on up to `available_parallelism` scoped threads, preserving input order.
pub fn analyze_files(detector: &SpoofDetector, paths: &[PathBuf]) -> Vec<FileReport> {
    let threads = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    analyze_files_with(detector, paths, threads)
}

/// Analyze files in at most `threads` contiguous batches.
pub fn analyze_files_with(
    detector: &SpoofDetector,
    paths: &[PathBuf],
    threads: usize,
) -> Vec<FileReport> {
    if paths.is_empty() {
        return Vec::new();
    }

    let batch = paths.len().div_ceil(threads.max(1));

    std::thread::scope(|scope| {
        let workers: Vec<_> = paths
            .chunks(batch)
            .map(|chunk| {
                let worker = scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|path| analyze_file(detector, path))
                        .collect::<Vec<_>>()
                });
                (worker, chunk)
            })
            .collect();

        workers
            .into_iter()
            .flat_map(|(worker, chunk)| {
                worker.join().unwrap_or_else(|_| {
                    chunk
                        .iter()
                        .map(|path| FileReport::failed(path, &eyre!("analysis panicked")))
                        .collect()
                })
            })
            .collect()
    })
}

fn analyze_file(detector: &SpoofDetector, path: &Path) -> FileReport {
    let result = AudioClip::from_file(path)
        .wrap_err_with(|| format!("failed to load audio: {:?}", path.display()))
        .and_then(|clip| {
            tracing::debug!(
                path = ?path.display(),
                duration_sec = clip.duration_secs(),
                "loaded clip"
            );
            detector.analyze(&clip).map_err(eyre::Report::from)
        });

    match result {
        Ok(result) => FileReport::analyzed(path, result),
        Err(e) => {
            tracing::warn!(path = ?path.display(), error = %e, "rejected");
            FileReport::failed(path, &e)
        }
    }
}

/// Build a session builder with execution providers configured by Cargo features.
///
/// Configures ONNX Runtime session with execution providers in priority order. The first
/// available provider is used; CPU is always available as fallback.
///
/// # Execution Providers
///
/// Enabled via Cargo features:
/// - `cuda` - NVIDIA CUDA
/// - `tensorrt` - NVIDIA TensorRT
/// - `openvino` - Intel OpenVINO
/// - `directml` - DirectML (Windows)
/// - `coreml` - CoreML (macOS)
fn session_builder() -> ort::Result<SessionBuilder> {
    Session::builder()?.with_execution_providers([
        #[cfg(feature = "cuda")]
        CUDAExecutionProvider::default().build(),
        #[cfg(feature = "tensorrt")]
        TensorRTExecutionProvider::default().build(),
        #[cfg(feature = "openvino")]
        OpenVINOExecutionProvider::default()
            .with_device_type("HETERO:GPU,CPU")
            .with_cache_dir(".cache/ort")
            .build(),
        #[cfg(feature = "directml")]
        DirectMLExecutionProvider::default().build(),
        #[cfg(feature = "coreml")]
        CoreMLExecutionProvider::default().build(),
    ])
}

/// Format seconds as a string with two decimal places.
fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}
