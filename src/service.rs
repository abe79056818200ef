use std::{sync::Arc, time::Duration};

use axum::body::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::{error::PredictError, model::CaptionModel, preprocess::preprocess_jpeg};

/// Turns uploaded JPEG bytes into a caption using the process-wide model.
///
/// Built once at startup and shared by every request. Cloning is cheap.
#[derive(Clone)]
pub struct CaptionService {
    model: Arc<dyn CaptionModel>,
    // single permit; `None` lets requests run inference in parallel
    guard: Option<Arc<Semaphore>>,
    timeout: Duration,
}

impl CaptionService {
    pub fn new(model: Arc<dyn CaptionModel>, timeout: Duration) -> Self {
        Self {
            model,
            guard: None,
            timeout,
        }
    }

    /// Allow only one inference at a time, for runtimes that are not
    /// safe to call concurrently.
    pub fn serialized(mut self, serialize: bool) -> Self {
        self.guard = serialize.then(|| Arc::new(Semaphore::new(1)));
        self
    }

    pub fn is_serialized(&self) -> bool {
        self.guard.is_some()
    }

    /// Preprocess, infer and decode one image.
    ///
    /// The CPU-bound part runs on the blocking pool. If it does not finish
    /// within the configured timeout the request fails, though the blocking
    /// task keeps its inference slot until it returns.
    pub async fn caption(&self, image: Bytes) -> Result<String, PredictError> {
        let model = self.model.clone();
        let guard = self.guard.clone();

        let work = async move {
            let permit = match guard {
                Some(semaphore) => Some(
                    semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| PredictError::Worker(e.to_string()))?,
                ),
                None => None,
            };

            tokio::task::spawn_blocking(move || -> Result<String, PredictError> {
                let _permit = permit;
                let tensor = preprocess_jpeg(&image)?;
                debug!(shape = ?tensor.shape(), "image preprocessed");
                let outputs = model.infer(tensor)?;
                Ok(outputs.into_caption()?)
            })
            .await
            .map_err(|e| PredictError::Worker(e.to_string()))?
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PredictError::Timeout(self.timeout))?
    }
}
