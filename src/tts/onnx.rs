use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{ArrayD, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::Deserialize;

use super::audio::RawWaveform;
use super::loader::LoadError;
use super::neural::{
    GeneratedAudio, Generator, InstructionGuidedGenerator, LoadedModel, PlainGenerator,
};
use super::SynthesisError;

pub const CONFIG_FILE: &str = "config.json";
pub const MODEL_FILE: &str = "model.onnx";

/// Display name when the config does not carry one.
pub const DEFAULT_MODEL_NAME: &str = "Qwen3-TTS-VoiceDesign";

const TEXT_INPUT: &str = "input_ids";
const INSTRUCT_INPUT: &str = "instruct_ids";
const SPEAKER_INPUT: &str = "speaker_id";
const LANGUAGE_INPUT: &str = "language_id";
const AUDIO_OUTPUTS: [&str; 3] = ["audio", "waveform", "output"];

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub sample_rate: u32,
    #[serde(default)]
    pub vocab: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub speakers: HashMap<String, i64>,
    #[serde(default)]
    pub languages: HashMap<String, i64>,
    /// Id for characters missing from `vocab`. Without one they are dropped.
    #[serde(default)]
    pub unk_id: Option<i64>,
    #[serde(default)]
    pub framing: Framing,
    /// Intra-op threads. Defaults to the available cores.
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Ids placed around and between encoded characters. Exports that frame
/// their input declare it in `config.json`; the default adds nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Framing {
    #[serde(default)]
    pub bos: Vec<i64>,
    #[serde(default)]
    pub eos: Vec<i64>,
    #[serde(default)]
    pub separator: Vec<i64>,
}

impl ModelConfig {
    pub fn load(model_dir: &Path) -> Result<Self, LoadError> {
        let config_path = model_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(LoadError::MissingFile(config_path));
        }
        Ok(serde_json::from_reader(File::open(&config_path)?)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Plain,
    InstructionGuided,
}

/// Decide the generation shape from the session's input names.
pub fn detect_capability<S: AsRef<str>>(inputs: &[S]) -> Result<Capability, LoadError> {
    let has = |name: &str| inputs.iter().any(|i| i.as_ref() == name);

    if has(TEXT_INPUT) && has(INSTRUCT_INPUT) {
        Ok(Capability::InstructionGuided)
    } else if has(TEXT_INPUT) {
        Ok(Capability::Plain)
    } else {
        Err(LoadError::UnsupportedModelInterface(
            inputs.iter().map(|i| i.as_ref().to_string()).collect(),
        ))
    }
}

/// A TTS network exported to ONNX, driven through ONNX Runtime.
pub struct OnnxModel {
    session: Mutex<Session>,
    config: ModelConfig,
    inputs: HashSet<String>,
    outputs: Vec<String>,
}

/// Load `config.json` and `model.onnx` from `model_dir`, detecting the
/// generation capability once.
pub fn load_model(model_dir: &Path) -> Result<LoadedModel, LoadError> {
    let config = ModelConfig::load(model_dir)?;

    let model_path = model_dir.join(MODEL_FILE);
    if !model_path.exists() {
        return Err(LoadError::MissingFile(model_path));
    }

    let threads = config.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let session = open_session(&model_path, threads)?;

    let inputs: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
    let outputs: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    let capability = detect_capability(&inputs)?;

    let name = config
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

    let model = Arc::new(OnnxModel {
        session: Mutex::new(session),
        config,
        inputs: inputs.into_iter().collect(),
        outputs,
    });

    let generator = match capability {
        Capability::InstructionGuided => Generator::InstructionGuided(model),
        Capability::Plain => Generator::Plain(model),
    };

    Ok(LoadedModel { name, generator })
}

fn session_error<E: std::fmt::Display>(model_path: &Path) -> impl Fn(E) -> LoadError + '_ {
    move |e| LoadError::Session(format!("{}: {}", model_path.display(), e))
}

fn open_session(model_path: &Path, threads: usize) -> Result<Session, LoadError> {
    tracing::debug!("Opening {} with {} threads", model_path.display(), threads);
    let session = Session::builder()
        .map_err(session_error(model_path))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(session_error(model_path))?
        .with_intra_threads(threads)
        .map_err(session_error(model_path))?
        .commit_from_file(model_path)
        .map_err(session_error(model_path))?;
    Ok(session)
}

impl OnnxModel {
    fn run(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
        instruct: Option<&str>,
    ) -> Result<GeneratedAudio, SynthesisError> {
        let mut feeds: HashMap<String, Value> = HashMap::new();

        feeds.insert(TEXT_INPUT.to_string(), id_tensor(encode_text(text, &self.config)?)?);

        if let Some(instruct) = instruct {
            feeds.insert(
                INSTRUCT_INPUT.to_string(),
                id_tensor(encode_text(instruct, &self.config)?)?,
            );
        }

        if self.inputs.contains(SPEAKER_INPUT) {
            let id = self.config.speakers.get(speaker).copied().unwrap_or(0);
            feeds.insert(SPEAKER_INPUT.to_string(), scalar_tensor(id)?);
        }

        if self.inputs.contains(LANGUAGE_INPUT) {
            if let Some(&id) = self.config.languages.get(language) {
                feeds.insert(LANGUAGE_INPUT.to_string(), scalar_tensor(id)?);
            }
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| SynthesisError::Model("Session lock poisoned".to_string()))?;
        let outputs = session
            .run(feeds)
            .map_err(|e| SynthesisError::Model(format!("Inference failed: {}", e)))?;

        let output_name = AUDIO_OUTPUTS
            .iter()
            .copied()
            .find(|name| outputs.get(*name).is_some())
            .or_else(|| self.outputs.first().map(String::as_str))
            .ok_or_else(|| SynthesisError::Model("Missing output tensor".to_string()))?;

        let output = outputs
            .get(output_name)
            .ok_or_else(|| SynthesisError::Model("Missing output tensor".to_string()))?;

        let waveform = if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
            RawWaveform::Float(shaped(dims, data)?)
        } else if let Ok((shape, data)) = output.try_extract_tensor::<f64>() {
            let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
            RawWaveform::Double(shaped(dims, data)?)
        } else {
            let (shape, data) = output.try_extract_tensor::<i16>().map_err(|e| {
                SynthesisError::Model(format!("Failed to extract output tensor: {}", e))
            })?;
            let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
            RawWaveform::Pcm16(shaped(dims, data)?)
        };

        Ok(GeneratedAudio {
            waveform,
            sample_rate: self.config.sample_rate,
        })
    }
}

impl PlainGenerator for OnnxModel {
    fn generate(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
    ) -> Result<GeneratedAudio, SynthesisError> {
        self.run(text, language, speaker, None)
    }
}

impl InstructionGuidedGenerator for OnnxModel {
    fn generate_voice_design(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
        instruct: &str,
    ) -> Result<GeneratedAudio, SynthesisError> {
        self.run(text, language, speaker, Some(instruct))
    }
}

fn id_tensor(ids: Vec<i64>) -> Result<Value, SynthesisError> {
    let tensor = Tensor::from_array(([1usize, ids.len()], ids))
        .map_err(|e| SynthesisError::Model(format!("Failed to create input tensor: {}", e)))?;
    Ok(tensor.into())
}

fn scalar_tensor(id: i64) -> Result<Value, SynthesisError> {
    let tensor = Tensor::from_array(([1usize], vec![id]))
        .map_err(|e| SynthesisError::Model(format!("Failed to create input tensor: {}", e)))?;
    Ok(tensor.into())
}

fn shaped<T: Clone>(dims: Vec<usize>, data: &[T]) -> Result<ArrayD<T>, SynthesisError> {
    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| SynthesisError::Audio(format!("Malformed output tensor: {}", e)))
}

/// Encode text with the model's character vocabulary and the configured
/// framing. Text with no encodable character is an error.
pub fn encode_text(text: &str, config: &ModelConfig) -> Result<Vec<i64>, SynthesisError> {
    let mut body: Vec<i64> = Vec::new();
    let mut buf = [0u8; 4];

    for ch in text.chars() {
        let ids = match config.vocab.get(&*ch.encode_utf8(&mut buf)) {
            Some(ids) => ids.as_slice(),
            None => match &config.unk_id {
                Some(unk) => std::slice::from_ref(unk),
                None => continue,
            },
        };
        if !body.is_empty() {
            body.extend_from_slice(&config.framing.separator);
        }
        body.extend_from_slice(ids);
    }

    if body.is_empty() {
        let preview: String = text.chars().take(30).collect();
        return Err(SynthesisError::Model(format!(
            "No vocabulary entries for text '{}'",
            preview
        )));
    }

    let mut ids = config.framing.bos.clone();
    ids.extend(body);
    ids.extend_from_slice(&config.framing.eos);
    Ok(ids)
}
