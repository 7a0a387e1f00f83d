use crate::models::{HistoryEntry, PredictionRecord};
use serde::{Deserialize, Serialize};
use service_core::response::ApiResponse;

/// `POST /predict` success body.
pub type PredictionResponse = ApiResponse<PredictionRecord>;

/// `GET /predict/histories` success body.
pub type HistoryListResponse = ApiResponse<Vec<HistoryEntry>>;

/// Diagnostic payload returned with an ambiguous score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguousPredictionData {
    pub prediction: f32,
}
