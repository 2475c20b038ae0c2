//! Fakes for the voice engine and the neural model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::{Array1, Array2};

use super::audio::RawWaveform;
use super::loader::ModelLoadState;
use super::neural::{
    GeneratedAudio, Generator, InstructionGuidedGenerator, LoadedModel, PlainGenerator,
};
use super::system::{parse_voice_list, VoiceEngine};
use super::SynthesisError;

/// Excerpt of `espeak-ng --voices` from a stock install.
pub const ESPEAK_VOICE_LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  am              --/M      Amharic            sem/am
 5  an              --/M      Aragonese          roa/an
 5  ar              --/M      Arabic             sem/ar
 5  en-029          --/M      English_(Caribbean) gmw/en-029
 2  en-gb           --/M      English_(Great_Britain) gmw/en               (en 2)
 5  en-gb-scotland  --/M      English_(Scotland) gmw/en-GB-scotland   (en 4)
 5  en-gb-x-gbclan  --/M      English_(Lancaster) gmw/en-GB-x-gbclan   (en 5)
 5  en-gb-x-rp      --/M      English_(Received_Pronunciation) gmw/en-GB-x-rp       (en 4)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  es              --/M      Spanish_(Spain)    roa/es
";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineCall {
    pub text: String,
    pub voice: Option<String>,
    pub rate: u32,
    pub output: PathBuf,
}

/// Writes half a second of silence at 22050 Hz for every render.
pub struct FakeEngine {
    voices: Vec<String>,
    float: bool,
    fail: bool,
    calls: Mutex<Vec<EngineCall>>,
}

impl FakeEngine {
    pub const SAMPLE_RATE: u32 = 22050;
    pub const SAMPLES: usize = 11025;

    pub fn new() -> Self {
        Self::with_voices(parse_voice_list(ESPEAK_VOICE_LISTING))
    }

    pub fn with_voices(voices: Vec<String>) -> Self {
        Self {
            voices,
            float: false,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn float_output(mut self) -> Self {
        self.float = true;
        self
    }

    /// Writes the artifact, then reports failure.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl VoiceEngine for FakeEngine {
    fn voices(&self) -> &[String] {
        &self.voices
    }

    fn render(
        &self,
        text: &str,
        voice: Option<&str>,
        rate: u32,
        output: &Path,
    ) -> Result<(), SynthesisError> {
        self.calls.lock().unwrap().push(EngineCall {
            text: text.to_string(),
            voice: voice.map(str::to_string),
            rate,
            output: output.to_path_buf(),
        });

        let spec = WavSpec {
            channels: 1,
            sample_rate: Self::SAMPLE_RATE,
            bits_per_sample: if self.float { 32 } else { 16 },
            sample_format: if self.float {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        };
        let mut writer = WavWriter::create(output, spec)?;
        for _ in 0..Self::SAMPLES {
            if self.float {
                writer.write_sample(0.0f32)?;
            } else {
                writer.write_sample(0i16)?;
            }
        }
        writer.finalize()?;

        if self.fail {
            return Err(SynthesisError::Engine("engine crashed".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCall {
    pub text: String,
    pub language: String,
    pub speaker: String,
    pub instruct: Option<String>,
}

/// Returns a fixed waveform, or fails, for both generation shapes.
pub struct FakeModel {
    sample_rate: u32,
    waveform: Option<RawWaveform>,
    calls: Mutex<Vec<ModelCall>>,
}

impl FakeModel {
    /// A quarter second of silence shaped `[1, n]`.
    pub fn new(sample_rate: u32) -> Self {
        let samples = (sample_rate / 4) as usize;
        Self::with_waveform(
            sample_rate,
            RawWaveform::Float(Array2::<f32>::zeros((1, samples)).into_dyn()),
        )
    }

    pub fn with_waveform(sample_rate: u32, waveform: RawWaveform) -> Self {
        Self {
            sample_rate,
            waveform: Some(waveform),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn stereo(sample_rate: u32) -> Self {
        Self::with_waveform(
            sample_rate,
            RawWaveform::Float(Array2::<f32>::zeros((2, 64)).into_dyn()),
        )
    }

    pub fn pcm16(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self::with_waveform(sample_rate, RawWaveform::Pcm16(Array1::from(samples).into_dyn()))
    }

    pub fn failing() -> Self {
        Self {
            sample_rate: 24000,
            waveform: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, call: ModelCall) -> Result<GeneratedAudio, SynthesisError> {
        self.calls.lock().unwrap().push(call);
        match &self.waveform {
            Some(waveform) => Ok(GeneratedAudio {
                waveform: waveform.clone(),
                sample_rate: self.sample_rate,
            }),
            None => Err(SynthesisError::Model("inference exploded".into())),
        }
    }
}

impl PlainGenerator for FakeModel {
    fn generate(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
    ) -> Result<GeneratedAudio, SynthesisError> {
        self.respond(ModelCall {
            text: text.to_string(),
            language: language.to_string(),
            speaker: speaker.to_string(),
            instruct: None,
        })
    }
}

impl InstructionGuidedGenerator for FakeModel {
    fn generate_voice_design(
        &self,
        text: &str,
        language: &str,
        speaker: &str,
        instruct: &str,
    ) -> Result<GeneratedAudio, SynthesisError> {
        self.respond(ModelCall {
            text: text.to_string(),
            language: language.to_string(),
            speaker: speaker.to_string(),
            instruct: Some(instruct.to_string()),
        })
    }
}

pub fn loaded_model(model: Arc<FakeModel>, guided: bool) -> LoadedModel {
    let generator = if guided {
        Generator::InstructionGuided(model)
    } else {
        Generator::Plain(model)
    };
    LoadedModel {
        name: "Fake-TTS".to_string(),
        generator,
    }
}

pub fn loaded_state(model: Arc<FakeModel>, guided: bool) -> ModelLoadState {
    ModelLoadState::Loaded(Arc::new(loaded_model(model, guided)))
}
