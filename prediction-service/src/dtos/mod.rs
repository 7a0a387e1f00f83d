pub mod predictions;

pub use predictions::{AmbiguousPredictionData, HistoryListResponse, PredictionResponse};
