use std::path::{Path, PathBuf};
use std::sync::Arc;

use hf_hub::api::tokio::{ApiBuilder, ApiError};
use hf_hub::{Cache, Repo, RepoType};

use super::neural::LoadedModel;
use super::onnx::{self, CONFIG_FILE, MODEL_FILE};
use crate::config::Config;

/// Files a repository must publish to be served, in download order.
const MODEL_FILES: [&str; 2] = [CONFIG_FILE, MODEL_FILE];

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Missing model file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ONNX session error: {0}")]
    Session(String),

    #[error("Unsupported model interface (inputs: {0:?})")]
    UnsupportedModelInterface(Vec<String>),

    #[error("Hub request failed: {0}")]
    Hub(#[from] ApiError),

    #[error("Repository '{repo}' has no ONNX export (missing {missing:?}); set QWEN_MODEL_PATH or QWEN_MODEL_ID to one")]
    NoOnnxExport { repo: String, missing: Vec<String> },

    #[error("Model '{0}' is not cached and downloads are disabled")]
    Offline(String),

    #[error("Model load task failed: {0}")]
    Task(String),
}

/// Whether the neural model is available. Starts as `NotLoaded`, settles
/// exactly once at startup and is only read afterwards.
#[derive(Clone, Default)]
pub enum ModelLoadState {
    #[default]
    NotLoaded,
    Loaded(Arc<LoadedModel>),
    FailedFallback(String),
}

impl ModelLoadState {
    /// The one transition out of `NotLoaded`. A settled state ignores any
    /// later outcome.
    pub fn settle(self, outcome: Result<LoadedModel, LoadError>) -> Self {
        match (self, outcome) {
            (ModelLoadState::NotLoaded, Ok(model)) => ModelLoadState::Loaded(Arc::new(model)),
            (ModelLoadState::NotLoaded, Err(e)) => ModelLoadState::FailedFallback(e.to_string()),
            (settled, _) => settled,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelLoadState::Loaded(_))
    }

    pub fn model(&self) -> Option<&Arc<LoadedModel>> {
        match self {
            ModelLoadState::Loaded(model) => Some(model),
            _ => None,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model().map(|m| m.name.as_str())
    }
}

/// Where the weights will come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    LocalPath(PathBuf),
    Cache(PathBuf),
    Remote,
}

pub struct ModelLoader {
    model_path: Option<PathBuf>,
    cache: Cache,
    model_id: String,
    endpoint: String,
    offline: bool,
}

impl ModelLoader {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model_path: config.model_path.clone(),
            cache: config
                .cache_dir
                .clone()
                .map(Cache::new)
                .unwrap_or_else(Cache::from_env),
            model_id: config.model_id.clone(),
            endpoint: config.hf_endpoint.clone(),
            offline: config.offline,
        }
    }

    fn repo(&self) -> Repo {
        Repo::new(self.model_id.clone(), RepoType::Model)
    }

    /// Snapshot directory of the cached `main` revision, if it holds every
    /// model file.
    pub fn cached_snapshot(&self) -> Option<PathBuf> {
        let cached = self.cache.repo(self.repo());
        let paths = MODEL_FILES
            .iter()
            .map(|file| cached.get(file))
            .collect::<Option<Vec<_>>>()?;
        let snapshot = paths.last()?.parent()?.to_path_buf();
        Some(snapshot)
    }

    /// Explicit path, then cache, then remote.
    pub fn resolve_source(&self) -> ModelSource {
        if let Some(path) = self.model_path.as_ref().filter(|p| p.exists()) {
            return ModelSource::LocalPath(path.clone());
        }

        match self.cached_snapshot() {
            Some(snapshot) => ModelSource::Cache(snapshot),
            None => ModelSource::Remote,
        }
    }

    /// Never fails: any error leaves the process on system voice only.
    pub async fn load(&self) -> ModelLoadState {
        let outcome = self.try_load().await;
        match &outcome {
            Ok(model) => tracing::info!(
                "Model loaded successfully: {} ({})",
                model.name,
                model.generator.kind()
            ),
            Err(e) => {
                tracing::error!("Failed to load model '{}': {}", self.model_id, e);
                tracing::info!("Falling back to system voice");
            }
        }
        ModelLoadState::default().settle(outcome)
    }

    async fn try_load(&self) -> Result<LoadedModel, LoadError> {
        let model_dir = match self.resolve_source() {
            ModelSource::LocalPath(path) => {
                tracing::info!("Loading model from custom path: {}", path.display());
                path
            }
            ModelSource::Cache(snapshot) => {
                tracing::info!("Found cached model in {}", snapshot.display());
                snapshot
            }
            ModelSource::Remote if self.offline => {
                return Err(LoadError::Offline(self.model_id.clone()));
            }
            ModelSource::Remote => {
                tracing::info!("Model not found in cache");
                tracing::info!(
                    "Downloading model '{}' to {} - this may take a while...",
                    self.model_id,
                    self.cache.path().display()
                );
                self.download().await?
            }
        };

        tokio::task::spawn_blocking(move || onnx::load_model(&model_dir))
            .await
            .map_err(|e| LoadError::Task(e.to_string()))?
    }

    /// Fetch the model files through the hub client. Files land as blobs
    /// linked from the snapshot of the fetched commit, and `refs/main` points
    /// at that commit.
    async fn download(&self) -> Result<PathBuf, LoadError> {
        let api = ApiBuilder::from_cache(self.cache.clone())
            .with_endpoint(self.endpoint.clone())
            .with_progress(false)
            .build()?;
        let repo = api.repo(self.repo());

        let info = repo.info().await?;
        let missing: Vec<String> = MODEL_FILES
            .iter()
            .filter(|file| !info.siblings.iter().any(|s| s.rfilename == **file))
            .map(|file| file.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::NoOnnxExport {
                repo: self.model_id.clone(),
                missing,
            });
        }

        tracing::info!("Fetching {} at revision {}", self.model_id, info.sha);

        let mut snapshot = None;
        for file in MODEL_FILES {
            // Always fetched, so every file comes from the same commit even
            // when an older snapshot is partly cached.
            let path = repo.download(file).await?;
            tracing::debug!("Fetched {}", path.display());
            snapshot = path.parent().map(Path::to_path_buf);
        }

        snapshot.ok_or_else(|| LoadError::MissingFile(self.cache.path().clone()))
    }
}
