use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

/// Server settings. Every flag can also come from the environment (or `.env`).
#[derive(Debug, Clone, Parser)]
#[command(name = "caption-server")]
#[command(version)]
#[command(about = "Image captioning HTTP service", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
    pub bind_addr: SocketAddr,

    /// Local `.onnx` file, or a directory of signatures
    #[arg(long, env = "MODEL_PATH", default_value = "models/caption.onnx")]
    pub model_path: PathBuf,

    /// Where to fetch the model from when MODEL_PATH does not exist
    #[arg(long, env = "MODEL_URL")]
    pub model_url: Option<String>,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Run at most one inference at a time
    #[arg(long, env = "SERIALIZE_INFERENCE")]
    pub serialize_inference: bool,

    /// Upper bound for preprocessing plus inference of one request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "BODY_LIMIT_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub body_limit_bytes: usize,

    /// Origin allowed by CORS
    #[arg(long, env = "ALLOWED_ORIGIN", default_value = "http://localhost:5173")]
    pub allowed_origin: String,

    /// Enables `POST /generate-image`
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn http(&self) -> HttpOptions {
        HttpOptions {
            allowed_origin: self.allowed_origin.clone(),
            body_limit_bytes: self.body_limit_bytes,
        }
    }
}

/// The part of [`Config`] the router needs.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub allowed_origin: String,
    pub body_limit_bytes: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            allowed_origin: "http://localhost:5173".to_string(),
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}
