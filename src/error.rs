use std::{path::PathBuf, time::Duration};

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    fn response(status: StatusCode, error: impl Into<String>, detail: Option<String>) -> Response {
        (
            status,
            Json(ErrorBody {
                error: error.into(),
                detail,
            }),
        )
            .into_response()
    }
}

/// The uploaded bytes could not be turned into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not decode JPEG image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model runtime failed: {0}")]
    Runtime(String),
    #[error("input tensor has shape {actual:?}, model expects {expected:?}")]
    Shape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("model returned no outputs")]
    NoOutputs,
    #[error("text output `{0}` is empty")]
    EmptyText(String),
}

impl From<ort::Error> for InferenceError {
    fn from(err: ort::Error) -> Self {
        InferenceError::Runtime(err.to_string())
    }
}

/// Failures that stop the server from ever accepting requests.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("model not found at {path:?} and no MODEL_URL is configured")]
    ModelMissing { path: PathBuf },
    #[error("failed to fetch model from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching model from {url} returned HTTP {status}")]
    FetchStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("no .onnx signature found in {dir:?}")]
    NoSignature { dir: PathBuf },
    #[error("failed to load model {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
    #[error("model {path:?} declares no inputs")]
    NoInput { path: PathBuf },
    #[error("model loader task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Everything that can go wrong while serving `POST /predict`.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid file type. Only JPEG images are accepted.")]
    UnsupportedMediaType(Option<String>),
    #[error("missing multipart field `image`")]
    MissingImage,
    #[error(transparent)]
    NotMultipart(#[from] MultipartRejection),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Model inference failed")]
    Inference(#[from] InferenceError),
    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
    #[error("inference worker failed: {0}")]
    Worker(String),
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::UnsupportedMediaType(ref content_type) => {
                warn!(?content_type, "rejected upload with non-JPEG content type");
                ErrorBody::response(StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            PredictError::MissingImage => {
                warn!("rejected upload: {}", self);
                ErrorBody::response(StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            PredictError::NotMultipart(rejection) => {
                warn!("rejected non-multipart upload: {}", rejection);
                ErrorBody::response(rejection.status(), rejection.body_text(), None)
            }
            PredictError::Multipart(err) => {
                warn!("malformed multipart body: {}", err);
                ErrorBody::response(err.status(), err.body_text(), None)
            }
            PredictError::Decode(err) => {
                warn!("{}", err);
                ErrorBody::response(StatusCode::BAD_REQUEST, err.to_string(), None)
            }
            PredictError::Inference(err) => {
                error!("inference failed: {}", err);
                ErrorBody::response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Model inference failed",
                    Some(err.to_string()),
                )
            }
            PredictError::Timeout(_) => {
                error!("{}", self);
                ErrorBody::response(StatusCode::GATEWAY_TIMEOUT, self.to_string(), None)
            }
            PredictError::Worker(reason) => {
                error!("inference worker failed: {}", reason);
                ErrorBody::response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Model inference failed",
                    Some(reason),
                )
            }
        }
    }
}

/// Everything that can go wrong while serving `POST /generate-image`.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    InvalidBody(#[from] JsonRejection),
    #[error("No prompt provided")]
    MissingPrompt,
    #[error("image generation is not configured")]
    NotConfigured,
    #[error("OpenAI generation error: {0}")]
    Generation(String),
    #[error("Image fetch failed: {0}")]
    Fetch(String),
    #[error("JPEG conversion failed: {0}")]
    Conversion(#[from] image::ImageError),
}

impl IntoResponse for GenerateError {
    fn into_response(self) -> Response {
        match self {
            GenerateError::InvalidBody(rejection) => {
                warn!("rejected generation request: {}", rejection);
                ErrorBody::response(rejection.status(), rejection.body_text(), None)
            }
            GenerateError::MissingPrompt => {
                ErrorBody::response(StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            GenerateError::NotConfigured => {
                ErrorBody::response(StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None)
            }
            GenerateError::Generation(detail) => {
                error!("OpenAI image generation failed: {}", detail);
                ErrorBody::response(
                    StatusCode::BAD_GATEWAY,
                    "OpenAI generation error",
                    Some(detail),
                )
            }
            GenerateError::Fetch(detail) => {
                error!("failed to fetch generated image: {}", detail);
                ErrorBody::response(StatusCode::BAD_GATEWAY, "Image fetch failed", Some(detail))
            }
            GenerateError::Conversion(err) => {
                error!("JPEG conversion error: {}", err);
                ErrorBody::response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JPEG conversion failed",
                    Some(err.to_string()),
                )
            }
        }
    }
}
