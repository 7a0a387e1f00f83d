//! Classifier loading and inference.
//!
//! The artifact is an ONNX export of the classifier taking one NHWC `f32`
//! tensor of shape `[1, 224, 224, 3]` and returning the cancer probability as
//! the first output element. It runs on `tract`, a pure-Rust runtime.

use crate::config::{ModelCachePolicy, ModelConfig};
use crate::services::metrics;
use crate::services::preprocess::{InferenceInput, INPUT_SIZE};
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tract_onnx::prelude::*;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to fetch model artifact from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model artifact request to {url} returned HTTP {status}")]
    FetchStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to read model artifact {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid model artifact: {0}")]
    Load(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model produced an empty output")]
    EmptyOutput,

    #[error("Model task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Raw classifier output; the first element is P(Cancer).
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput(pub Vec<f32>);

impl InferenceOutput {
    pub fn score(&self) -> Result<f32, ModelError> {
        self.0.first().copied().ok_or(ModelError::EmptyOutput)
    }
}

pub trait Classifier: Send + Sync {
    fn predict(&self, input: &InferenceInput) -> Result<InferenceOutput, ModelError>;
}

/// Hands out a ready-to-run classifier. Implementations decide whether the
/// artifact is loaded once or per call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn classifier(&self) -> Result<Arc<dyn Classifier>, ModelError>;
}

/// Run the classifier on the blocking pool and return the first output element.
pub async fn infer(
    classifier: Arc<dyn Classifier>,
    input: InferenceInput,
) -> Result<f32, ModelError> {
    let started = Instant::now();
    let output = tokio::task::spawn_blocking(move || classifier.predict(&input)).await??;
    metrics::record_inference_duration(started.elapsed());

    tracing::debug!(output = ?output.0, "Prediction data");
    output.score()
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

pub struct TractClassifier {
    plan: OnnxPlan,
}

impl TractClassifier {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let size = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .and_then(|model| model.with_input_fact(0, f32::fact([1, size, size, 3]).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelError::Load(format!("{:#}", e)))?;

        Ok(Self { plan })
    }
}

impl Classifier for TractClassifier {
    fn predict(&self, input: &InferenceInput) -> Result<InferenceOutput, ModelError> {
        let tensor: Tensor = input.as_array().clone().into();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ModelError::Inference(format!("{:#}", e)))?;

        let first = outputs.first().ok_or(ModelError::EmptyOutput)?;
        let values = first
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(format!("{:#}", e)))?
            .iter()
            .copied()
            .collect();

        Ok(InferenceOutput(values))
    }
}

/// Loads the ONNX artifact from a URL or path, honoring the cache policy.
pub struct TractModelProvider {
    location: String,
    policy: ModelCachePolicy,
    http: reqwest::Client,
    cached: OnceCell<Arc<TractClassifier>>,
}

impl TractModelProvider {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            location: config.url.clone(),
            policy: config.cache,
            http: reqwest::Client::new(),
            cached: OnceCell::new(),
        }
    }

    pub fn policy(&self) -> ModelCachePolicy {
        self.policy
    }

    async fn load(&self) -> Result<Arc<TractClassifier>, ModelError> {
        let started = Instant::now();
        tracing::info!(location = %self.location, "Loading model");

        let result: Result<TractClassifier, ModelError> = async {
            let bytes = fetch_artifact(&self.http, &self.location).await?;
            tokio::task::spawn_blocking(move || TractClassifier::from_bytes(&bytes)).await?
        }
        .await;

        match result {
            Ok(classifier) => {
                metrics::record_model_load(true);
                tracing::info!(
                    location = %self.location,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded successfully"
                );
                Ok(Arc::new(classifier))
            }
            Err(e) => {
                metrics::record_model_load(false);
                tracing::error!(location = %self.location, error = %e, "Error loading model");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ModelProvider for TractModelProvider {
    async fn classifier(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        let classifier: Arc<dyn Classifier> = match self.policy {
            // A failed init leaves the cell empty, so the next request retries.
            ModelCachePolicy::Shared => self.cached.get_or_try_init(|| self.load()).await?.clone(),
            ModelCachePolicy::PerRequest => self.load().await?,
        };
        Ok(classifier)
    }
}

/// Read the artifact from `http(s)://`, `file://` or a plain path.
pub async fn fetch_artifact(http: &reqwest::Client, location: &str) -> Result<Vec<u8>, ModelError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = http.get(location).send().await.map_err(|e| ModelError::Fetch {
            url: location.to_string(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(ModelError::FetchStatus {
                url: location.to_string(),
                status: response.status(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| ModelError::Fetch {
            url: location.to_string(),
            source: e,
        })?;
        return Ok(bytes.to_vec());
    }

    let path = location.strip_prefix("file://").unwrap_or(location);
    tokio::fs::read(path).await.map_err(|e| ModelError::Read {
        path: path.to_string(),
        source: e,
    })
}
