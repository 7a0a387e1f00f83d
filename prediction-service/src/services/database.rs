use crate::models::{HistoryEntry, PredictionDocument, PredictionRecord};
use crate::services::history::{HistoryError, HistoryStore};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::{
    bson::doc, options::ReplaceOptions, Client as MongoClient, Collection, Database,
};
use service_core::error::AppError;

#[derive(Clone)]
pub struct MongoHistoryStore {
    client: MongoClient,
    db: Database,
    collection: String,
}

impl MongoHistoryStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(
            database = %database,
            collection = %collection,
            "Successfully connected to MongoDB database"
        );
        Ok(Self {
            client,
            db,
            collection: collection.to_string(),
        })
    }

    pub fn predictions(&self) -> Collection<PredictionDocument> {
        self.db.collection(&self.collection)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl HistoryStore for MongoHistoryStore {
    async fn put(&self, record: &PredictionRecord) -> Result<(), HistoryError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.predictions()
            .replace_one(
                doc! { "_id": &record.id },
                PredictionDocument::from(record.clone()),
                options,
            )
            .await
            .map_err(|e| {
                tracing::error!(prediction_id = %record.id, "Failed to save prediction: {}", e);
                HistoryError::from(e)
            })?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut cursor = self.predictions().find(None, None).await?;

        let mut entries = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            entries.push(HistoryEntry::from(doc));
        }
        Ok(entries)
    }

    async fn health_check(&self) -> Result<(), HistoryError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                HistoryError::from(e)
            })?;
        Ok(())
    }
}
