use std::{sync::Arc, time::Instant};

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::ApiError,
    model::Classifier,
    prediction::{rank, Prediction},
    preprocess::preprocess,
};

/// Name of the multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        AppState { classifier }
    }
}

pub fn create_app(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let mut multipart = multipart?;
    let mut image_data = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            image_data = Some(field.bytes().await?);
            break;
        }
    }

    let image_data = image_data.ok_or(ApiError::MissingFile)?;
    debug!(bytes = image_data.len(), "received upload");

    let classifier = Arc::clone(&state.classifier);
    let prediction = tokio::task::spawn_blocking(move || classify(classifier.as_ref(), &image_data))
        .await?
        .map_err(|err| {
            if let ApiError::Image(ref e) = err {
                warn!(error = %e, "rejected upload");
            }
            err
        })?;

    info!(
        label = %prediction.label,
        confidence = prediction.confidence,
        uncertain = prediction.is_uncertain(),
        "prediction served"
    );
    Ok(Json(prediction))
}

fn classify(classifier: &dyn Classifier, image_data: &[u8]) -> Result<Prediction, ApiError> {
    let started = Instant::now();
    let input = preprocess(image_data)?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "preprocessed image");

    let started = Instant::now();
    let scores = classifier.scores(&input)?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, ?scores, "ran inference");

    Ok(rank(&scores)?)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}
