use std::{io::Cursor, time::Duration};

use base64::{engine::general_purpose, Engine as _};
use image::ImageOutputFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GenerateError;

const GENERATION_MODEL: &str = "dall-e-2";
const IMAGE_SIZE: &str = "512x512";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const JPEG_QUALITY: u8 = 90;

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Client for the OpenAI text-to-image endpoint.
#[derive(Clone)]
pub struct ImageGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ImageGenerator {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Generate one image for `prompt` and return it as JPEG bytes.
    pub async fn generate_jpeg(&self, prompt: &str) -> Result<Vec<u8>, GenerateError> {
        let image = self.generate(prompt).await?;
        let bytes = match (image.url, image.b64_json) {
            (Some(url), _) => {
                info!("Image URL: {}", url);
                self.fetch(&url).await?
            }
            (None, Some(encoded)) => general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| GenerateError::Generation(e.to_string()))?,
            (None, None) => {
                return Err(GenerateError::Generation(
                    "response carried neither url nor b64_json".to_string(),
                ))
            }
        };

        Ok(to_jpeg(&bytes)?)
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerateError> {
        let url = format!("{}/images/generations", self.base_url);
        let request = GenerationRequest {
            model: GENERATION_MODEL,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            response_format: "url",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerateError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Generation(format!("HTTP {}: {}", status, body)));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Generation(e.to_string()))?;

        body.data
            .into_iter()
            .next()
            .ok_or_else(|| GenerateError::Generation("no image in response".to_string()))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GenerateError> {
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GenerateError::Fetch(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerateError::Fetch(e.to_string()))?;
        debug!(bytes = bytes.len(), "fetched generated image");

        Ok(bytes.to_vec())
    }
}

/// Re-encode any decodable image as an RGB JPEG.
pub fn to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();

    let mut jpeg_bytes = Vec::new();
    image::DynamicImage::ImageRgb8(rgb).write_to(
        &mut Cursor::new(&mut jpeg_bytes),
        ImageOutputFormat::Jpeg(JPEG_QUALITY),
    )?;

    Ok(jpeg_bytes)
}
