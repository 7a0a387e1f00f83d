use crate::config::{HistoryBackend, ModelCachePolicy, PredictionConfig};
use crate::handlers;
use crate::services::{
    HistoryStore, InMemoryHistoryStore, ModelProvider, MongoHistoryStore, TractModelProvider,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Headroom above the file cap for multipart boundaries and part headers.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Dependencies shared by every request. Both collaborators sit behind trait
/// objects so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: PredictionConfig,
    pub model: Arc<dyn ModelProvider>,
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(
        config: PredictionConfig,
        model: Arc<dyn ModelProvider>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            model,
            history,
        }
    }

    /// Wire the production collaborators described by `config`.
    pub async fn from_config(config: &PredictionConfig) -> Result<Self, AppError> {
        let history: Arc<dyn HistoryStore> = match config.history.backend {
            HistoryBackend::MongoDb => Arc::new(
                MongoHistoryStore::connect(
                    config.mongodb.uri.expose_secret(),
                    &config.mongodb.database,
                    &config.mongodb.collection,
                )
                .await?,
            ),
            HistoryBackend::Memory => {
                tracing::warn!("Using in-memory history store, records are lost on restart");
                Arc::new(InMemoryHistoryStore::new())
            }
        };

        let provider = TractModelProvider::new(&config.model);
        tracing::info!(
            location = %config.model.url,
            policy = ?provider.policy(),
            "Model provider configured"
        );

        if config.model.preload && provider.policy() == ModelCachePolicy::Shared {
            // A failed preload is not fatal: the first request tries again.
            if let Err(e) = provider.classifier().await {
                tracing::warn!(error = %e, "Model preload failed");
            }
        }

        Ok(Self::new(config.clone(), Arc::new(provider), history))
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/predict", post(handlers::predict))
        .route("/predict/histories", get(handlers::list_histories))
        .route_layer(from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    pub async fn build(config: PredictionConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(&config).await?;
        Self::with_state(state).await
    }

    /// Bind the router for an already assembled state.
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            router: build_router(state.clone()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    pub async fn run_with_graceful_shutdown<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(signal)
            .await
    }
}
