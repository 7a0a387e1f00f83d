use crate::dtos::AmbiguousPredictionData;
use crate::services::{HistoryError, ModelError, PreprocessError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use service_core::response::ApiResponse;
use thiserror::Error;

pub const PREDICTION_FAILED_MESSAGE: &str = "Terjadi kesalahan dalam melakukan prediksi";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str =
    "Payload content length greater than maximum allowed: 1000000";
pub const HISTORY_FAILED_MESSAGE: &str = "Failed to retrieve histories";

/// Request-level failures of the prediction endpoints.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Ambiguous prediction score: {score}")]
    Ambiguous { score: f32 },

    #[error("No `image` field in upload")]
    MissingImage,

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Failed to persist prediction: {0}")]
    Persist(#[source] HistoryError),

    #[error("Failed to list histories: {0}")]
    HistoryUnavailable(#[source] HistoryError),
}

impl PredictionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PredictionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictionError::HistoryUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Label used for the `predictions_total` counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            PredictionError::PayloadTooLarge { .. } => "too_large",
            PredictionError::Ambiguous { .. } => "ambiguous",
            _ => "error",
        }
    }
}

impl IntoResponse for PredictionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            PredictionError::PayloadTooLarge { limit } => {
                tracing::warn!(limit, "Rejected oversized upload");
                ApiResponse::fail(PAYLOAD_TOO_LARGE_MESSAGE).with_status(status)
            }
            PredictionError::Ambiguous { score } => {
                tracing::warn!(score, "Rejected ambiguous prediction");
                ApiResponse::fail_with_data(
                    PREDICTION_FAILED_MESSAGE,
                    AmbiguousPredictionData { prediction: score },
                )
                .with_status(status)
            }
            PredictionError::HistoryUnavailable(err) => {
                tracing::error!(error = %err, "Failed to retrieve histories");
                ApiResponse::fail(HISTORY_FAILED_MESSAGE).with_status(status)
            }
            err => {
                tracing::error!(error = %err, "Prediction failed");
                ApiResponse::fail(PREDICTION_FAILED_MESSAGE).with_status(status)
            }
        }
    }
}
