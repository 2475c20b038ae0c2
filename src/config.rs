use std::path::PathBuf;

/// The upstream voice-design checkpoint. It publishes no `model.onnx`, so a
/// fresh start without `QWEN_MODEL_PATH` stays on the system voice until
/// `QWEN_MODEL_ID` names a repository carrying an ONNX export.
pub const DEFAULT_MODEL_ID: &str = "Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign";
const DEFAULT_PORT: u16 = 7860;
const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:8888,http://127.0.0.1:8888";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a port number, got '{value}'")]
    InvalidPort { var: &'static str, value: String },
}

/// Server configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: Option<PathBuf>,
    pub model_id: String,
    /// Hub cache override. `None` leaves it to the hub client, which honours
    /// `HF_HOME` and defaults to `~/.cache/huggingface/hub`.
    pub cache_dir: Option<PathBuf>,
    pub hf_endpoint: String,
    pub offline: bool,
    pub espeak_bin: PathBuf,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("QWEN_SERVER_PORT") {
            Some(value) => match value.trim().parse() {
                Ok(port) => port,
                Err(_) => {
                    return Err(ConfigError::InvalidPort {
                        var: "QWEN_SERVER_PORT",
                        value,
                    })
                }
            },
            None => DEFAULT_PORT,
        };

        let offline = var("HF_HUB_OFFLINE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            model_path: var("QWEN_MODEL_PATH").map(PathBuf::from),
            model_id: var("QWEN_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            cache_dir: var("HF_HUB_CACHE").map(PathBuf::from),
            hf_endpoint: var("HF_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            offline,
            espeak_bin: var("ESPEAK_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("espeak-ng")),
            cors_origins,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
