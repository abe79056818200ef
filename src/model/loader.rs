use std::path::PathBuf;

use tracing::{debug, info};

use super::{ModelFetcher, OnnxCaptionModel, OnnxModelConfig};
use crate::{config::Config, error::StartupError};

/// Makes sure the captioning model is on disk, then loads it.
///
/// Runs once before the listener is bound; any error here is fatal.
pub struct ModelLoader {
    model_path: PathBuf,
    model_url: Option<String>,
    intra_threads: usize,
    fetcher: ModelFetcher,
}

impl ModelLoader {
    pub fn new(model_path: impl Into<PathBuf>, model_url: Option<String>) -> Self {
        Self {
            model_path: model_path.into(),
            model_url,
            intra_threads: OnnxModelConfig::default().num_intra_thread,
            fetcher: ModelFetcher::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.model_path.clone(), config.model_url.clone())
            .with_intra_threads(config.intra_threads)
    }

    pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
        self.intra_threads = intra_threads;
        self
    }

    /// Return the local model path, fetching the artifact first if it is absent.
    pub async fn ensure_local(&self) -> Result<PathBuf, StartupError> {
        if tokio::fs::try_exists(&self.model_path).await? {
            debug!("model found at {:?}", self.model_path);
            return Ok(self.model_path.clone());
        }

        let url = self
            .model_url
            .as_deref()
            .ok_or_else(|| StartupError::ModelMissing {
                path: self.model_path.clone(),
            })?;

        info!("model missing at {:?}, fetching from {}", self.model_path, url);
        self.fetcher
            .download_to_path_if_not_exists(url, &self.model_path)
            .await
    }

    pub async fn load(&self) -> Result<OnnxCaptionModel, StartupError> {
        let path = self.ensure_local().await?;
        let config = OnnxModelConfig {
            num_intra_thread: self.intra_threads,
            ..Default::default()
        };

        // session construction parses the whole graph
        tokio::task::spawn_blocking(move || OnnxCaptionModel::load(path, config))
            .await
            .map_err(|e| StartupError::Task(e.to_string()))?
    }
}
