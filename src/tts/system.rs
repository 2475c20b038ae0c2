use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use hound::{SampleFormat, WavReader};
use ndarray::Array1;

use super::audio::{self, RawWaveform};
use super::voice::VoiceRegistry;
use super::{SynthesisError, SynthesisResult};

/// Words per minute at speed 1.0.
pub const BASE_RATE: f64 = 200.0;

/// A host text-to-speech engine that renders whole utterances to WAV files.
pub trait VoiceEngine: Send + Sync {
    /// Host voice identifiers, in engine order.
    fn voices(&self) -> &[String];

    /// Render `text` into a WAV file at `output`. `voice` of `None` keeps the
    /// engine default.
    fn render(
        &self,
        text: &str,
        voice: Option<&str>,
        rate: u32,
        output: &Path,
    ) -> Result<(), SynthesisError>;
}

/// espeak-ng driven as a subprocess.
pub struct EspeakEngine {
    program: PathBuf,
    voices: Vec<String>,
}

impl EspeakEngine {
    /// Probe the executable and read its voice list once.
    pub fn detect(program: impl Into<PathBuf>) -> Result<Self, SynthesisError> {
        let program = program.into();

        let output = Command::new(&program)
            .arg("--voices")
            .output()
            .map_err(|e| {
                SynthesisError::BackendUnavailable(format!(
                    "Failed to run {} (is it installed?): {}",
                    program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::BackendUnavailable(format!(
                "{} --voices failed: {}",
                program.display(),
                stderr.trim()
            )));
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));

        Ok(Self { program, voices })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl VoiceEngine for EspeakEngine {
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
        let mut command = Command::new(&self.program);
        if let Some(voice) = voice {
            command.args(["-v", voice]);
        }
        command
            .arg("-s")
            .arg(rate.to_string())
            .arg("-w")
            .arg(output)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            SynthesisError::Engine(format!("Failed to start {}: {}", self.program.display(), e))
        })?;

        // Text goes through stdin so it can never be parsed as a flag. The
        // write runs on its own thread while stderr drains.
        let stdin = child.stdin.take();
        let (result, written) = std::thread::scope(|scope| {
            let writer =
                stdin.map(|mut stdin| scope.spawn(move || stdin.write_all(text.as_bytes())));
            let result = child.wait_with_output();
            let written = match writer {
                Some(writer) => writer.join().unwrap_or_else(|_| {
                    Err(std::io::Error::other("stdin writer panicked"))
                }),
                None => Ok(()),
            };
            (result, written)
        });

        let result = result?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(SynthesisError::Engine(format!(
                "espeak-ng failed: {}",
                stderr.trim()
            )));
        }
        written?;

        Ok(())
    }
}

/// English voices placed first, in this order, when the host has them.
/// Registry indices point into the resulting list.
const PREFERRED_VOICES: [&str; 3] = ["en-us", "en-gb", "en-gb-x-rp"];

/// Parse `espeak-ng --voices` output into voice identifiers usable with `-v`.
///
/// espeak lists voices alphabetically by language, so the raw order would put
/// Afrikaans at index 0. Only English voices are kept, preferred ones first.
/// A host with no English voice keeps its full list.
pub fn parse_voice_list(listing: &str) -> Vec<String> {
    let languages: Vec<String> = listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Pty"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect();

    let mut english: Vec<String> = languages
        .iter()
        .filter(|lang| lang.as_str() == "en" || lang.starts_with("en-"))
        .cloned()
        .collect();

    if english.is_empty() {
        return languages;
    }

    english.sort_by_key(|lang| {
        PREFERRED_VOICES
            .iter()
            .position(|preferred| preferred == lang)
            .unwrap_or(PREFERRED_VOICES.len())
    });
    english
}

/// `BASE_RATE * speed`, truncated.
pub fn effective_rate(speed: f64) -> u32 {
    (BASE_RATE * speed) as u32
}

/// Last-resort backend. Never rejects a voice name; only fails when the host
/// engine is missing or the rendered artifact cannot be read back.
pub struct SystemVoiceBackend {
    registry: VoiceRegistry,
    engine: Option<Arc<dyn VoiceEngine>>,
}

impl SystemVoiceBackend {
    pub fn new(registry: VoiceRegistry, engine: Arc<dyn VoiceEngine>) -> Self {
        Self {
            registry,
            engine: Some(engine),
        }
    }

    /// A backend for hosts without a voice engine; every call fails.
    pub fn unavailable(registry: VoiceRegistry) -> Self {
        Self {
            registry,
            engine: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f64,
    ) -> Result<SynthesisResult, SynthesisError> {
        let engine = self.engine.as_ref().ok_or_else(|| {
            SynthesisError::BackendUnavailable(
                "No system voice engine available. Install espeak-ng".to_string(),
            )
        })?;

        if !self.registry.contains(voice) {
            tracing::debug!("Unknown voice '{}', using the first system voice", voice);
        }
        let index = self.registry.resolve(voice);
        let host_voice = engine.voices().get(index).map(String::as_str);
        let rate = effective_rate(speed);

        tracing::info!(
            "Synthesizing with system voice: voice={} ({}), rate={}",
            voice,
            host_voice.unwrap_or("engine default"),
            rate
        );

        // Unique per call, removed when dropped on every path below.
        let artifact = tempfile::Builder::new()
            .prefix("qwen-tts-")
            .suffix(".wav")
            .tempfile()?;

        engine.render(text, host_voice, rate, artifact.path())?;

        read_artifact(artifact.path()).map_err(|e| {
            tracing::error!("Error reading system voice output: {}", e);
            e
        })
    }
}

/// Read a rendered WAV back, keeping PCM16 mono verbatim and re-encoding any
/// other mono format.
fn read_artifact(path: &Path) -> Result<SynthesisResult, SynthesisError> {
    let bytes = std::fs::read(path)?;

    let (spec, frames) = {
        let reader = WavReader::new(Cursor::new(bytes.as_slice()))?;
        (reader.spec(), reader.duration())
    };

    if spec.channels != 1 {
        return Err(SynthesisError::MultiChannel(vec![
            frames as usize,
            spec.channels as usize,
        ]));
    }

    if spec.sample_format == SampleFormat::Int && spec.bits_per_sample == 16 {
        return Ok(SynthesisResult {
            duration_ms: audio::duration_ms(frames as usize, spec.sample_rate),
            sample_rate_hz: spec.sample_rate,
            audio: bytes,
        });
    }

    let reader = WavReader::new(Cursor::new(bytes.as_slice()))?;
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    audio::normalize(
        RawWaveform::Float(Array1::from(samples).into_dyn()),
        spec.sample_rate,
    )
}
