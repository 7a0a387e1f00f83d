pub mod prediction;

pub use prediction::{HistoryEntry, PredictionDocument, PredictionRecord, PredictionResult};
