//! Persistence of accepted predictions.

use crate::models::{HistoryEntry, PredictionRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("History store unavailable: {0}")]
    Unavailable(String),
}

/// Document store holding one record per accepted prediction.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Upsert keyed by `record.id`.
    async fn put(&self, record: &PredictionRecord) -> Result<(), HistoryError>;

    /// Full scan, unordered.
    async fn list_all(&self) -> Result<Vec<HistoryEntry>, HistoryError>;

    async fn health_check(&self) -> Result<(), HistoryError> {
        Ok(())
    }
}

/// Process-local store for tests and local runs without MongoDB.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryStore {
    records: Arc<DashMap<String, PredictionRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<PredictionRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn put(&self, record: &PredictionRecord) -> Result<(), HistoryError> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self
            .records
            .iter()
            .map(|entry| HistoryEntry {
                id: entry.key().clone(),
                history: entry.value().clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionResult;

    fn sorted_ids(entries: &[HistoryEntry]) -> Vec<String> {
        let mut ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn put_then_list_round_trips() {
        let store = InMemoryHistoryStore::new();
        let record = PredictionRecord::new(PredictionResult::Cancer, "Segera periksa ke dokter!");
        store.put(&record).await.unwrap();

        let entries = store.list_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, record.id);
        assert_eq!(entries[0].history, record);
    }

    #[tokio::test]
    async fn put_is_an_upsert() {
        let store = InMemoryHistoryStore::new();
        let record = PredictionRecord::new(PredictionResult::NonCancer, "first");
        store.put(&record).await.unwrap();
        store.put(&record).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&record.id), Some(record));
    }

    #[tokio::test]
    async fn listing_twice_returns_same_set() {
        let store = InMemoryHistoryStore::new();
        for _ in 0..5 {
            store
                .put(&PredictionRecord::new(PredictionResult::Cancer, "x"))
                .await
                .unwrap();
        }

        let first = store.list_all().await.unwrap();
        let second = store.list_all().await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(sorted_ids(&first), sorted_ids(&second));
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let store = InMemoryHistoryStore::new();
        assert!(store.is_empty());
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(store.health_check().await.is_ok());
    }
}
