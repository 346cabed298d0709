use crate::{
    model_service::{InferenceError, ModelService},
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predicted_class: String,
    pub confidence: f64,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub success: bool,
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No image provided")]
    MissingImage,
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{0}")]
    Inference(#[from] InferenceError),
    #[error("Model returned unknown class index {0}")]
    UnknownClass(usize),
}

impl PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingImage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            success: false,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[instrument(skip(state, request))]
pub async fn predict<M: ModelService, S: crate::state::State>(
    State(state): State<SharedState<M, S>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, PredictError> {
    let encoded = request.image.ok_or(PredictError::MissingImage)?;
    let image_data = BASE64_STANDARD.decode(strip_data_uri(&encoded))?;

    let prediction = state.model_service.predict(image_data).await?;

    let predicted_class = state
        .service_state
        .label_for(prediction.class_index)
        .ok_or(PredictError::UnknownClass(prediction.class_index))?
        .to_string();

    let confidence = round_confidence(prediction.probability);
    tracing::debug!("Predicted {} at {:.2}%", predicted_class, confidence);

    Ok(Json(PredictResponse {
        predicted_class,
        confidence,
        success: true,
    }))
}

/// Browser uploads arrive as `data:image/png;base64,<payload>`.
fn strip_data_uri(encoded: &str) -> &str {
    match encoded.split_once(',') {
        Some((_, payload)) => payload,
        None => encoded,
    }
}

fn round_confidence(probability: f32) -> f64 {
    (probability as f64 * 100.0 * 100.0).round() / 100.0
}
