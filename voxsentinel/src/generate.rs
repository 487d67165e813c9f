//! Gen subcommand - write synthetic WAV clips for exercising the pipeline.

use eyre::{Context, Result, ensure};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// Tone frequency for `--sine` clips.
pub const SINE_FREQUENCY: f32 = 440.0;
/// Peak amplitude of `--sine` clips, as a fraction of full scale.
pub const SINE_AMPLITUDE: f32 = 0.5;

/// CLI arguments for clip generation.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Output WAV path
    pub output: PathBuf,

    /// Clip length in seconds
    #[arg(short, long, default_value_t = 5.0)]
    pub duration: f32,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 44100)]
    pub sample_rate: u32,

    /// Write a 440 Hz tone instead of silence
    #[arg(long)]
    pub sine: bool,
}

/// Resolved configuration for clip generation.
#[derive(Debug)]
pub struct Config {
    pub output: PathBuf,
    pub duration: f32,
    pub sample_rate: u32,
    pub sine: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            output: args.output,
            duration: args.duration,
            sample_rate: args.sample_rate,
            sine: args.sine,
        }
    }
}

pub fn execute(config: Config) -> Result<()> {
    ensure!(config.sample_rate > 0, "sample rate must be positive");
    ensure!(
        config.duration.is_finite() && config.duration >= 0.0,
        "duration must be a non-negative number of seconds"
    );

    let samples = synthesize(&config);
    write_wav(&config.output, &samples, config.sample_rate)?;

    tracing::info!(
        path = ?config.output.display(),
        samples = samples.len(),
        sine = config.sine,
        "clip written"
    );

    Ok(())
}

/// 16-bit samples for the configured clip.
pub fn synthesize(config: &Config) -> Vec<i16> {
    let n = (config.duration * config.sample_rate as f32) as usize;

    if !config.sine {
        return vec![0; n];
    }

    let rate = config.sample_rate as f32;
    (0..n)
        .map(|i| {
            let s = SINE_AMPLITUDE * (2.0 * PI * SINE_FREQUENCY * i as f32 / rate).sin();
            (s * i16::MAX as f32) as i16
        })
        .collect()
}

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .wrap_err_with(|| format!("failed to create: {:?}", path.display()))?;

    for &s in samples {
        writer.write_sample(s)?;
    }

    writer
        .finalize()
        .wrap_err_with(|| format!("failed to finalize: {:?}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sine: bool) -> Config {
        Config {
            output: PathBuf::new(),
            duration: 0.5,
            sample_rate: 8000,
            sine,
        }
    }

    #[test]
    fn silent_clip_is_all_zeros() {
        let samples = synthesize(&config(false));

        assert_eq!(samples.len(), 4000);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn sine_clip_peaks_at_half_scale() {
        let samples = synthesize(&config(true));
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();

        assert_eq!(samples.len(), 4000);
        assert!(peak > 16000 && peak <= 16384, "peak {peak}");
    }

    #[test]
    fn writes_readable_wav() {
        let path = std::env::temp_dir().join("vs_generate_sine.wav");
        let config = Config {
            output: path.clone(),
            ..config(true)
        };

        execute(config).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.len(), 4000);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let config = Config {
            sample_rate: 0,
            ..config(false)
        };

        assert!(execute(config).is_err());
    }
}
