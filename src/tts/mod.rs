pub mod audio;
pub mod loader;
pub mod neural;
pub mod onnx;
pub mod system;
pub mod voice;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use serde::Deserialize;

pub use loader::{ModelLoadState, ModelLoader};
pub use neural::NeuralBackend;
pub use system::{EspeakEngine, SystemVoiceBackend};
pub use voice::VoiceRegistry;

/// Prosody value the UI sends when the user picked nothing.
pub const DEFAULT_PROSODY: &str = "speak normally";

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Text is required")]
    TextRequired,

    #[error("No neural model is loaded")]
    ModelNotLoaded,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Multi-channel audio is not supported (shape {0:?})")]
    MultiChannel(Vec<usize>),

    #[error("Sample rate must be positive")]
    InvalidSampleRate,

    #[error("System voice unavailable: {0}")]
    BackendUnavailable(String),

    #[error("System voice engine failed: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Synthesis task failed: {0}")]
    Task(String),
}

/// One synthesized utterance, WAV-encoded PCM16 mono.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub sample_rate_hz: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_prosody", alias = "prosody_instruction")]
    pub prosody_instruction: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_output_format", alias = "output_format")]
    pub output_format: String,
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_prosody() -> String {
    DEFAULT_PROSODY.to_string()
}

fn default_speed() -> f64 {
    1.0
}

fn default_output_format() -> String {
    "wav".to_string()
}

#[cfg(test)]
impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: default_voice(),
            prosody_instruction: default_prosody(),
            speed: default_speed(),
            output_format: default_output_format(),
        }
    }
}

/// Picks a backend per request: the neural model when one is loaded, the
/// system voice otherwise or whenever the model fails.
#[derive(Clone)]
pub struct Synthesizer {
    state: ModelLoadState,
    system: Arc<SystemVoiceBackend>,
}

impl Synthesizer {
    pub fn new(state: ModelLoadState, system: Arc<SystemVoiceBackend>) -> Self {
        Self { state, system }
    }

    pub fn state(&self) -> &ModelLoadState {
        &self.state
    }

    pub async fn handle(&self, request: &SynthesisRequest) -> Result<SynthesisResult, SynthesisError> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::TextRequired);
        }

        if let Some(model) = self.state.model() {
            let neural = NeuralBackend::new(Some(Arc::clone(model)));
            let text = request.text.clone();
            let voice = request.voice.clone();
            let prosody = request.prosody_instruction.clone();
            let speed = request.speed;

            match run_blocking(move || neural.synthesize(&text, &voice, &prosody, speed)).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!("Neural synthesis failed: {}", e);
                    tracing::info!("Falling back to system voice");
                }
            }
        }

        let system = Arc::clone(&self.system);
        let text = request.text.clone();
        let voice = request.voice.clone();
        let speed = request.speed;

        run_blocking(move || system.synthesize(&text, &voice, speed)).await
    }
}

async fn run_blocking<F>(job: F) -> Result<SynthesisResult, SynthesisError>
where
    F: FnOnce() -> Result<SynthesisResult, SynthesisError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| SynthesisError::Task(e.to_string()))?
}
