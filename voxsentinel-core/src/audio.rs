//! Audio loading utilities.
//!
//! Decoding container formats is left to callers; this module only covers
//! WAV so the CLI and tests have a waveform source.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use std::io::Read;
use std::path::Path;

/// Decoded mono waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    /// Samples, roughly in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Load a WAV file as mono samples at its native rate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = WavReader::open(path)?;
        Self::from_wav_reader(reader)
    }

    /// Load WAV bytes from any reader as mono samples at its native rate.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let reader = WavReader::new(reader)?;
        Self::from_wav_reader(reader)
    }

    fn from_wav_reader<R: Read>(reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();

        if spec.channels == 0 {
            return Err(AudioError::InvalidChannels(spec.channels).into());
        }

        let interleaved = read_samples(reader, spec)?;
        let samples = downmix(&interleaved, spec.channels);

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            samples = samples.len(),
            "loaded wav"
        );

        Ok(Self::new(samples, spec.sample_rate))
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Read interleaved samples scaled to [-1, 1].
fn read_samples<R: Read>(mut reader: WavReader<R>, spec: WavSpec) -> Result<Vec<f32>> {
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<_>>()?
        }
    };

    Ok(samples)
}

/// Average interleaved channels into one.
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
