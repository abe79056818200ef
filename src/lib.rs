//! Image captioning service: `POST /predict` turns a JPEG upload into a caption
//! using a pretrained model loaded once at startup.

pub mod config;
pub mod error;
pub mod imagegen;
pub mod model;
pub mod notebook;
pub mod preprocess;
pub mod routes;
pub mod service;

pub use config::{Config, HttpOptions};
pub use error::{DecodeError, GenerateError, InferenceError, PredictError, StartupError};
pub use model::{CaptionModel, ModelLoader, ModelOutputs, OutputTensor};
pub use routes::{router, AppState};
pub use service::CaptionService;
