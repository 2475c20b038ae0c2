use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::ArrayD;

use super::{SynthesisError, SynthesisResult};

/// Waveform exactly as a model produced it, shape included.
#[derive(Debug, Clone)]
pub enum RawWaveform {
    Float(ArrayD<f32>),
    Double(ArrayD<f64>),
    Pcm16(ArrayD<i16>),
}

impl RawWaveform {
    pub fn shape(&self) -> &[usize] {
        match self {
            RawWaveform::Float(a) => a.shape(),
            RawWaveform::Double(a) => a.shape(),
            RawWaveform::Pcm16(a) => a.shape(),
        }
    }
}

/// Squeeze, convert to PCM16 and wrap in a mono WAV container.
pub fn normalize(raw: RawWaveform, sample_rate: u32) -> Result<SynthesisResult, SynthesisError> {
    if sample_rate == 0 {
        return Err(SynthesisError::InvalidSampleRate);
    }

    let pcm: Vec<i16> = match raw {
        RawWaveform::Float(a) => squeeze(a)?.into_iter().map(|s| float_to_pcm16(s as f64)).collect(),
        RawWaveform::Double(a) => squeeze(a)?.into_iter().map(float_to_pcm16).collect(),
        RawWaveform::Pcm16(a) => squeeze(a)?,
    };

    let audio = encode_wav(&pcm, sample_rate)?;

    Ok(SynthesisResult {
        audio,
        sample_rate_hz: sample_rate,
        duration_ms: duration_ms(pcm.len(), sample_rate),
    })
}

/// `round(samples / rate * 1000)`, zero for empty audio.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if samples == 0 || sample_rate == 0 {
        return 0;
    }
    (samples as f64 / sample_rate as f64 * 1000.0).round() as u64
}

/// Clamp to [-1, 1], scale by 32767 and truncate.
fn float_to_pcm16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn squeeze<T: Clone>(array: ArrayD<T>) -> Result<Vec<T>, SynthesisError> {
    if array.is_empty() {
        return Ok(Vec::new());
    }

    let wide_axes = array.shape().iter().filter(|&&d| d != 1).count();
    if wide_axes > 1 {
        return Err(SynthesisError::MultiChannel(array.shape().to_vec()));
    }

    Ok(array.iter().cloned().collect())
}

/// Encode PCM16 samples as a mono WAV file in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, SynthesisError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(buffer)
}
