use std::sync::Arc;

use super::audio::{self, RawWaveform};
use super::{SynthesisError, SynthesisResult, DEFAULT_PROSODY};

/// Language tag passed to every generation call.
pub const LANGUAGE: &str = "English";

/// Instruction used when the request carries only the UI default prosody.
pub const NEUTRAL_INSTRUCTION: &str = "Speak in a natural, clear voice";

/// Waveform and rate as returned by a model, before normalization.
#[derive(Debug, Clone)]
pub struct GeneratedAudio {
    pub waveform: RawWaveform,
    pub sample_rate: u32,
}

/// Plain text-to-speech generation.
pub trait PlainGenerator: Send + Sync {
    fn generate(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
    ) -> Result<GeneratedAudio, SynthesisError>;
}

/// Voice-design generation steered by a natural-language instruction.
pub trait InstructionGuidedGenerator: Send + Sync {
    fn generate_voice_design(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
        instruct: &str,
    ) -> Result<GeneratedAudio, SynthesisError>;
}

/// Capability of a loaded model, fixed at load time.
#[derive(Clone)]
pub enum Generator {
    Plain(Arc<dyn PlainGenerator>),
    InstructionGuided(Arc<dyn InstructionGuidedGenerator>),
}

impl Generator {
    pub fn kind(&self) -> &'static str {
        match self {
            Generator::Plain(_) => "plain",
            Generator::InstructionGuided(_) => "voice-design",
        }
    }
}

pub struct LoadedModel {
    pub name: String,
    pub generator: Generator,
}

/// Instruction for voice-design generation.
pub fn voice_instruction(prosody: &str) -> &str {
    if prosody.is_empty() || prosody == DEFAULT_PROSODY {
        NEUTRAL_INSTRUCTION
    } else {
        prosody
    }
}

/// Runs the loaded model. Never falls back on its own; errors go back to
/// the caller.
pub struct NeuralBackend {
    model: Option<Arc<LoadedModel>>,
}

impl NeuralBackend {
    pub fn new(model: Option<Arc<LoadedModel>>) -> Self {
        Self { model }
    }

    /// `speed` is not applied: the model has no rate control.
    pub fn synthesize(
        &self,
        text: &str,
        voice: &str,
        prosody: &str,
        _speed: f64,
    ) -> Result<SynthesisResult, SynthesisError> {
        let model = self.model.as_ref().ok_or(SynthesisError::ModelNotLoaded)?;

        let preview: String = text.chars().take(30).collect();
        tracing::info!(
            "Synthesizing with {} ({}): text='{}...', voice={}",
            model.name,
            model.generator.kind(),
            preview,
            voice
        );

        let generated = match &model.generator {
            Generator::InstructionGuided(g) => {
                g.generate_voice_design(text, LANGUAGE, voice, voice_instruction(prosody))
            }
            Generator::Plain(g) => g.generate(text, LANGUAGE, voice),
        }
        .and_then(|out| {
            tracing::debug!(
                "Model output: shape {:?} at {}Hz",
                out.waveform.shape(),
                out.sample_rate
            );
            audio::normalize(out.waveform, out.sample_rate)
        });

        match generated {
            Ok(result) => {
                tracing::info!(
                    "{} synthesis complete: {}ms audio at {}Hz",
                    model.name,
                    result.duration_ms,
                    result.sample_rate_hz
                );
                Ok(result)
            }
            Err(e) => {
                tracing::error!("{} synthesis failed: {}", model.name, e);
                Err(e)
            }
        }
    }
}
