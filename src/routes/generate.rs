use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use super::AppState;
use crate::error::GenerateError;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[instrument(skip_all)]
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, GenerateError> {
    let Json(payload) = payload?;
    let prompt = payload
        .prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or(GenerateError::MissingPrompt)?;

    let generator = state.generator.as_ref().ok_or(GenerateError::NotConfigured)?;
    let jpeg = generator.generate_jpeg(&prompt).await?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}
