use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PredictionResult {
    Cancer,
    #[serde(rename = "Non-cancer")]
    NonCancer,
}

impl PredictionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionResult::Cancer => "Cancer",
            PredictionResult::NonCancer => "Non-cancer",
        }
    }
}

/// One accepted prediction. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: String,
    pub result: PredictionResult,
    pub suggestion: String,
    /// ISO-8601, UTC, millisecond precision (`2024-05-01T10:20:30.123Z`).
    pub created_at: String,
}

impl PredictionRecord {
    pub fn new(result: PredictionResult, suggestion: impl Into<String>) -> Self {
        Self::new_at(result, suggestion, Utc::now())
    }

    pub fn new_at(
        result: PredictionResult,
        suggestion: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            result,
            suggestion: suggestion.into(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Storage shape: the record fields plus `_id` mirroring `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionDocument {
    #[serde(rename = "_id")]
    pub key: String,
    #[serde(flatten)]
    pub record: PredictionRecord,
}

impl From<PredictionRecord> for PredictionDocument {
    fn from(record: PredictionRecord) -> Self {
        Self {
            key: record.id.clone(),
            record,
        }
    }
}

/// Item of the history listing: `{ "id": ..., "history": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub history: PredictionRecord,
}

impl From<PredictionDocument> for HistoryEntry {
    fn from(doc: PredictionDocument) -> Self {
        Self {
            id: doc.key,
            history: doc.record,
        }
    }
}
