#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use caption_server::{
    router, AppState, CaptionModel, CaptionService, HttpOptions, InferenceError, ModelOutputs,
    OutputTensor,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::{arr1, Array4};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

pub const BOUNDARY: &str = "caption-server-test-boundary";

pub struct Part<'a> {
    pub name: &'a str,
    pub content_type: Option<&'a str>,
    pub data: Vec<u8>,
}

impl<'a> Part<'a> {
    pub fn image(content_type: &'a str, data: Vec<u8>) -> Self {
        Self {
            name: "image",
            content_type: Some(content_type),
            data,
        }
    }
}

pub fn multipart_request(uri: &str, parts: &[Part]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\n",
                part.name
            )
            .as_bytes(),
        );
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn predict_request(parts: &[Part]) -> Request<Body> {
    multipart_request("/predict", parts)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn solid_jpeg(color: [u8; 3], width: u32, height: u32) -> Vec<u8> {
    encode(RgbImage::from_pixel(width, height, Rgb(color)), ImageOutputFormat::Jpeg(95))
}

pub fn solid_png(color: [u8; 3]) -> Vec<u8> {
    encode(RgbImage::from_pixel(32, 32, Rgb(color)), ImageOutputFormat::Png)
}

fn encode(image: RgbImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn app_with(model: Arc<dyn CaptionModel>) -> Router {
    app_with_service(CaptionService::new(model, Duration::from_secs(10)))
}

pub fn app_with_service(captioner: CaptionService) -> Router {
    router(
        AppState {
            captioner,
            generator: None,
        },
        &HttpOptions::default(),
    )
}

pub fn text_outputs(caption: &str) -> ModelOutputs {
    ModelOutputs::new().with(
        "caption",
        OutputTensor::Text(arr1(&[caption.to_string()]).into_dyn()),
    )
}

/// Always answers with the same outputs and counts how often it was asked.
pub struct FixedModel {
    outputs: ModelOutputs,
    pub calls: AtomicUsize,
}

impl FixedModel {
    pub fn new(outputs: ModelOutputs) -> Arc<Self> {
        Arc::new(Self {
            outputs,
            calls: AtomicUsize::new(0),
        })
    }
}

impl CaptionModel for FixedModel {
    fn signature(&self) -> &str {
        "serving_default"
    }

    fn infer(&self, _input: Array4<f32>) -> Result<ModelOutputs, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outputs.clone())
    }
}

pub struct FailingModel;

impl CaptionModel for FailingModel {
    fn signature(&self) -> &str {
        "serving_default"
    }

    fn infer(&self, _input: Array4<f32>) -> Result<ModelOutputs, InferenceError> {
        Err(InferenceError::Runtime("graph execution aborted".to_string()))
    }
}

/// Captions an image by its mean red value and records how many
/// inferences overlap.
pub struct OverlapModel {
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl OverlapModel {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn describe(input: &Array4<f32>) -> String {
        let red = input.slice(ndarray::s![0, .., .., 0]);
        format!("red={:.2}", red.mean().unwrap_or_default())
    }
}

impl CaptionModel for OverlapModel {
    fn signature(&self) -> &str {
        "overlap"
    }

    fn infer(&self, input: Array4<f32>) -> Result<ModelOutputs, InferenceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        std::thread::sleep(self.delay);
        let caption = Self::describe(&input);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(text_outputs(&caption))
    }
}
