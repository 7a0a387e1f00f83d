use crate::dtos::{HistoryListResponse, PredictionResponse};
use crate::error::PredictionError;
use crate::models::{PredictionRecord, PredictionResult};
use crate::services::model::infer;
use crate::services::preprocess::preprocess_image;
use crate::services::{decide, metrics, DecisionOutcome};
use crate::startup::AppState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::response::ApiResponse;

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

pub const PREDICTION_SUCCESS_MESSAGE: &str = "Model is predicted successfully";

pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, PredictionError> {
    let outcome = run_prediction(&state, multipart).await;
    match &outcome {
        Ok(record) => metrics::record_prediction(match record.result {
            PredictionResult::Cancer => "cancer",
            PredictionResult::NonCancer => "non_cancer",
        }),
        Err(err) => metrics::record_prediction(err.outcome()),
    }

    let body: PredictionResponse = ApiResponse::success(PREDICTION_SUCCESS_MESSAGE, outcome?);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn run_prediction(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionRecord, PredictionError> {
    let mut multipart = multipart.map_err(|e| PredictionError::Multipart(e.body_text()))?;
    let limit = state.config.upload.max_file_size;

    let bytes = read_image_field(&mut multipart, limit).await?;
    tracing::debug!(size = bytes.len(), "Image upload received");

    let input = preprocess_image(bytes).await?;
    let classifier = state.model.classifier().await?;
    let score = infer(classifier, input).await?;

    let (result, suggestion) = match decide(score) {
        DecisionOutcome::Ambiguous { score } => {
            return Err(PredictionError::Ambiguous { score });
        }
        DecisionOutcome::Verdict {
            result, suggestion, ..
        } => (result, suggestion),
    };

    let record = PredictionRecord::new(result, suggestion);

    // Persist before responding.
    state
        .history
        .put(&record)
        .await
        .map_err(PredictionError::Persist)?;

    tracing::info!(
        prediction_id = %record.id,
        result = %record.result.as_str(),
        score,
        "Prediction saved"
    );

    Ok(record)
}

/// Read the `image` field, rejecting it as soon as it grows past `limit` bytes.
async fn read_image_field(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<Vec<u8>, PredictionError> {
    let to_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            PredictionError::PayloadTooLarge { limit }
        } else {
            PredictionError::Multipart(e.body_text())
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(to_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let mut data = Vec::new();
        let mut oversized = false;
        while let Some(chunk) = field.chunk().await.map_err(to_error)? {
            if data.len() + chunk.len() > limit {
                oversized = true;
                break;
            }
            data.extend_from_slice(&chunk);
        }

        if oversized {
            // Consume the rest so the client reads the 413 instead of a reset.
            // The router's body limit bounds how much is read here.
            while let Ok(Some(_)) = field.chunk().await {}
            drop(field);
            drain(multipart).await;
            return Err(PredictionError::PayloadTooLarge { limit });
        }
        return Ok(data);
    }

    Err(PredictionError::MissingImage)
}

async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

pub async fn list_histories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PredictionError> {
    let entries = state
        .history
        .list_all()
        .await
        .map_err(PredictionError::HistoryUnavailable)?;

    tracing::debug!(count = entries.len(), "Histories retrieved");

    let body: HistoryListResponse = ApiResponse::data(entries);
    Ok((StatusCode::OK, Json(body)))
}
