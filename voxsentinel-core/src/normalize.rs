//! Sample-rate conversion, silence trimming and fixed-duration framing.

use crate::config::{PipelineConfig, SilenceTrim};
use crate::error::AudioError;
use rubato::{FftFixedIn, Resampler};

/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Power floor used when converting to dB
const AMIN: f32 = 1e-10;

/// Brings any decoded waveform to the fixed rate and length the extractor expects.
#[derive(Clone, Debug)]
pub struct SignalNormalizer {
    target_rate: u32,
    target_samples: usize,
    trim: Option<SilenceTrim>,
}

impl SignalNormalizer {
    pub fn new(target_rate: u32, duration_secs: f32, trim: Option<SilenceTrim>) -> Self {
        Self {
            target_rate,
            target_samples: (target_rate as f64 * duration_secs as f64).round() as usize,
            trim,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.target_sample_rate,
            config.clip_duration_seconds,
            config.trim_silence,
        )
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn target_samples(&self) -> usize {
        self.target_samples
    }

    /// Resample, trim and force the clip to exactly `target_samples` samples.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Empty`] if `samples` is empty. Silence is not an
    /// error: a clip that trims to nothing becomes a zero-filled buffer.
    pub fn normalize(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::Empty);
        }
        if source_rate == 0 {
            return Err(AudioError::InvalidSampleRate(source_rate));
        }

        let mut audio = resample(samples, source_rate, self.target_rate)?;

        if let Some(trim) = &self.trim {
            let range = trim_range(&audio, trim);
            tracing::debug!(?range, len = audio.len(), "trimmed silence");
            audio.truncate(range.end);
            audio.drain(..range.start);
        }

        if audio.is_empty() {
            tracing::debug!("clip is silent, substituting zero buffer");
            return Ok(vec![0.0; self.target_samples]);
        }

        audio.resize(self.target_samples, 0.0);

        Ok(audio)
    }
}

/// Resample mono audio with an FFT-based resampler.
///
/// Output has `ceil(len * to / from)` samples with the filter delay removed.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 2, 1)?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + delay);

    let mut position = 0;
    while position + resampler.input_frames_next() <= samples.len() {
        let end = position + resampler.input_frames_next();
        let wave_in: &[&[f32]] = &[&samples[position..end]];
        let chunk = resampler.process(wave_in, None)?;
        output.extend_from_slice(&chunk[0]);
        position = end;
    }

    if position < samples.len() {
        let wave_in: &[&[f32]] = &[&samples[position..]];
        let chunk = resampler.process_partial(Some(wave_in), None)?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the filter tail
    while output.len() < expected + delay {
        let chunk = resampler.process_partial::<&[f32]>(None, None)?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    tracing::debug!(from_rate, to_rate, input = samples.len(), output = output.len(), "resampled");

    Ok(output)
}

/// Sample range that survives trimming; empty when the whole clip is silent.
///
/// Frames are centred on multiples of `hop_length`. A frame is kept when its
/// RMS power is within `top_db` of the loudest frame.
pub fn trim_range(audio: &[f32], trim: &SilenceTrim) -> std::ops::Range<usize> {
    let power = frame_power(audio, trim.frame_length, trim.hop_length);

    let peak = power.iter().copied().fold(0.0_f32, f32::max);
    if peak <= AMIN {
        return 0..0;
    }

    let threshold = 10.0 * peak.log10() - trim.top_db;
    let loud = |p: &f32| 10.0 * p.max(AMIN).log10() > threshold;

    let (Some(first), Some(last)) = (power.iter().position(loud), power.iter().rposition(loud))
    else {
        return 0..0;
    };

    let start = (first * trim.hop_length).min(audio.len());
    let end = ((last + 1) * trim.hop_length).min(audio.len());

    start..end
}

/// Mean-square power of centred, zero-padded frames.
fn frame_power(audio: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    let num_frames = 1 + audio.len() / hop_length;
    let half = frame_length / 2;

    (0..num_frames)
        .map(|frame_idx| {
            let center = frame_idx * hop_length;
            let start = center.saturating_sub(half);
            let end = (center + frame_length - half).min(audio.len());

            let energy: f32 = audio
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .map(|s| s * s)
                .sum();

            energy / frame_length as f32
        })
        .collect()
}
