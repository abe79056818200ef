use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowHeaders, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{config::HttpOptions, imagegen::ImageGenerator, service::CaptionService};

mod generate;
mod predict;

pub use generate::{generate_image, GenerateRequest};
pub use predict::{predict, PredictResponse, ACCEPTED_CONTENT_TYPES, IMAGE_FIELD};

pub struct AppState {
    pub captioner: CaptionService,
    pub generator: Option<ImageGenerator>,
}

pub fn router(state: AppState, options: &HttpOptions) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/generate-image", post(generate_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(options.body_limit_bytes))
        .layer(cors(&options.allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

fn cors(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            warn!("ignoring invalid allowed origin {:?}: {}", allowed_origin, e);
            layer
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
