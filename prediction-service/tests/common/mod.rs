#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use prediction_service::config::{
    HistoryBackend, HistoryConfig, ModelCachePolicy, ModelConfig, MongoConfig, PredictionConfig,
    UploadConfig, DEFAULT_MAX_FILE_SIZE,
};
use prediction_service::services::{
    Classifier, HistoryError, HistoryStore, InMemoryHistoryStore, InferenceInput, InferenceOutput,
    ModelError, ModelProvider,
};
use prediction_service::models::{HistoryEntry, PredictionRecord};
use prediction_service::startup::{AppState, Application};
use reqwest::multipart;
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn test_config() -> PredictionConfig {
    PredictionConfig {
        common: CoreConfig {
            port: 0, // Random port for testing
            log_level: "debug".to_string(),
        },
        history: HistoryConfig {
            backend: HistoryBackend::Memory,
        },
        mongodb: MongoConfig {
            uri: Secret::new("mongodb://localhost:27017".to_string()),
            database: "prediction_test".to_string(),
            collection: "predictions".to_string(),
        },
        model: ModelConfig {
            url: "model/model.onnx".to_string(),
            cache: ModelCachePolicy::Shared,
            preload: false,
        },
        upload: UploadConfig {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        },
        otlp_endpoint: None,
    }
}

struct FakeClassifier {
    output: Vec<f32>,
    predictions: Arc<AtomicUsize>,
}

impl Classifier for FakeClassifier {
    fn predict(&self, input: &InferenceInput) -> Result<InferenceOutput, ModelError> {
        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        self.predictions.fetch_add(1, Ordering::SeqCst);
        Ok(InferenceOutput(self.output.clone()))
    }
}

/// Model provider returning a fixed output, optionally failing the first loads.
pub struct FakeModelProvider {
    output: Vec<f32>,
    failures_left: AtomicUsize,
    loads: AtomicUsize,
    predictions: Arc<AtomicUsize>,
}

impl FakeModelProvider {
    pub fn returning(score: f32) -> Arc<Self> {
        Self::with_output(vec![score], 0)
    }

    pub fn failing_first(failures: usize, score: f32) -> Arc<Self> {
        Self::with_output(vec![score], failures)
    }

    pub fn with_output(output: Vec<f32>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            output,
            failures_left: AtomicUsize::new(failures),
            loads: AtomicUsize::new(0),
            predictions: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn predictions(&self) -> usize {
        self.predictions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for FakeModelProvider {
    async fn classifier(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ModelError::Load("fake artifact unavailable".to_string()));
        }

        Ok(Arc::new(FakeClassifier {
            output: self.output.clone(),
            predictions: self.predictions.clone(),
        }))
    }
}

/// History store whose operations can be made to fail.
pub struct FailingHistoryStore {
    pub fail_put: bool,
    pub fail_list: bool,
}

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn put(&self, _record: &PredictionRecord) -> Result<(), HistoryError> {
        if self.fail_put {
            return Err(HistoryError::Unavailable("write refused".to_string()));
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        if self.fail_list {
            return Err(HistoryError::Unavailable("scan refused".to_string()));
        }
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("ping refused".to_string()))
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub model: Arc<FakeModelProvider>,
    pub history: Arc<dyn HistoryStore>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn(score: f32) -> Self {
        Self::spawn_with(
            FakeModelProvider::returning(score),
            Arc::new(InMemoryHistoryStore::new()),
        )
        .await
    }

    pub async fn spawn_with(model: Arc<FakeModelProvider>, history: Arc<dyn HistoryStore>) -> Self {
        let state = AppState::new(test_config(), model.clone(), history.clone());
        let app = Application::with_state(state)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            model,
            history,
            client,
        }
    }

    pub async fn post_image(&self, bytes: Vec<u8>) -> reqwest::Response {
        self.post_form(image_form(bytes)).await
    }

    pub async fn post_form(&self, form: multipart::Form) -> reqwest::Response {
        self.client
            .post(format!("{}/predict", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_histories(&self) -> reqwest::Response {
        self.client
            .get(format!("{}/predict/histories", self.address))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn stored(&self) -> Vec<HistoryEntry> {
        self.history
            .list_all()
            .await
            .expect("Failed to list history store")
    }
}

pub fn image_form(bytes: Vec<u8>) -> multipart::Form {
    multipart::Form::new().part(
        "image",
        multipart::Part::bytes(bytes)
            .file_name("skin.png")
            .mime_str("image/png")
            .unwrap(),
    )
}

pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A valid PNG of exactly `total_len` bytes, padded with a private ancillary
/// chunk that decoders skip.
pub fn png_of_size(total_len: usize) -> Vec<u8> {
    const SIGNATURE_AND_IHDR: usize = 8 + 25;
    const CHUNK_OVERHEAD: usize = 12;

    let png = png_image(16, 16);
    let padding = total_len - png.len() - CHUNK_OVERHEAD;

    let mut chunk = Vec::with_capacity(padding + CHUNK_OVERHEAD);
    chunk.extend_from_slice(&(padding as u32).to_be_bytes());
    let body_start = chunk.len();
    chunk.extend_from_slice(b"prVt");
    chunk.resize(chunk.len() + padding, b'x');
    let crc = crc32fast::hash(&chunk[body_start..]);
    chunk.extend_from_slice(&crc.to_be_bytes());

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&png[..SIGNATURE_AND_IHDR]);
    out.extend_from_slice(&chunk);
    out.extend_from_slice(&png[SIGNATURE_AND_IHDR..]);
    assert_eq!(out.len(), total_len);
    out
}
