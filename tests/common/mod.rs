//! Shared helpers for driving the router with stub classifiers.
#![allow(dead_code)]

use std::{io::Cursor, sync::Arc};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use leaf_doctor::{
    create_app,
    model::{Classifier, ModelError},
    AppState, Config,
};
use ndarray::Array4;
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

pub const BOUNDARY: &str = "leafdoctorboundary";

pub struct FixedScores(pub Vec<f32>);

impl Classifier for FixedScores {
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        Ok(self.0.clone())
    }
}

pub struct BrokenModel;

impl Classifier for BrokenModel {
    fn scores(&self, _input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::OutputLength {
            expected: 4,
            actual: 1000,
        })
    }
}

pub fn app_with(classifier: impl Classifier + 'static) -> Router {
    app_with_config(classifier, &Config::default())
}

pub fn app_with_config(classifier: impl Classifier + 'static, config: &Config) -> Router {
    create_app(AppState::new(Arc::new(classifier)), config)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}
