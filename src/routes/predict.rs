use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::AppState;
use crate::error::PredictError;

/// Multipart field holding the uploaded picture.
pub const IMAGE_FIELD: &str = "image";

pub const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/jpg"];

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub result: String,
}

#[instrument(skip_all)]
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            debug!(name = ?field.name(), "skipping multipart field");
            continue;
        }

        // checked before the body is read
        let content_type = field.content_type().map(str::to_owned);
        if !is_jpeg(content_type.as_deref()) {
            return Err(PredictError::UnsupportedMediaType(content_type));
        }

        let data = field.bytes().await?;
        debug!(bytes = data.len(), "image received");

        let result = state.captioner.caption(data).await?;
        info!(caption = %result, "caption generated");

        return Ok(Json(PredictResponse { result }));
    }

    Err(PredictError::MissingImage)
}

fn is_jpeg(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim();

    ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| essence.eq_ignore_ascii_case(accepted))
}
