//! Application startup and lifecycle management.
//!
//! Wires the configured backends into a [`PromptHandler`] and exposes it over
//! HTTP next to the health and readiness probes.

use crate::config::{InferenceBackend, PromptConfig, StorageBackend};
use crate::handler::{HandlerError, HandlerResponse, PromptHandler};
use crate::services::providers::bedrock::BedrockProvider;
use crate::services::providers::mock::MockInferenceProvider;
use crate::services::{ArtifactStorage, InferenceProvider, LocalStorage, S3Storage};
use crate::services::{PromptMetrics, ProviderError};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<PromptHandler>,
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        let mut res = (status, Json(self.body)).into_response();

        for (name, value) in self.headers {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                res.headers_mut()
                    .insert(name, HeaderValue::from_static(value));
            }
        }

        res
    }
}

impl From<HandlerError> for AppError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Inference(ProviderError::RateLimited) => {
                AppError::TooManyRequests("Model throttled the request".to_string(), None)
            }
            HandlerError::Inference(e) => AppError::BadGateway(e.to_string()),
            HandlerError::Storage(e) => AppError::InternalError(anyhow::Error::new(e)),
            HandlerError::Serialization(e) => AppError::InternalError(anyhow::Error::new(e)),
        }
    }
}

/// The raw request body is wrapped as `{"body": <text>}`, the shape a
/// function URL delivers, so both hosting surfaces share one resolution path.
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
async fn invoke(State(state): State<AppState>, body: Bytes) -> Result<HandlerResponse, AppError> {
    let event = json!({ "body": String::from_utf8_lossy(&body) });
    Ok(state.handler.handle(&event).await?)
}

/// Health check endpoint for liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "prompt-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint; ready once the inference backend reports healthy.
///
/// Bedrock has no side-effect free call to make here, so it reports ready
/// whenever its client has a region configured. A Bedrock deployment with a
/// region is therefore always ready; model access and credentials are only
/// exercised by `/invoke`.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.handler.inference().health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Inference provider not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Prometheus scrape endpoint.
async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.handler.metrics().gather() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn load_aws_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await
}

/// Construct the handler for `config`, loading AWS settings only when a
/// backend needs them.
pub async fn build_handler(config: &PromptConfig) -> Result<PromptHandler, AppError> {
    let sdk_config = OnceCell::new();

    let inference: Arc<dyn InferenceProvider> = match config.inference.backend {
        InferenceBackend::Bedrock => {
            let sdk = sdk_config
                .get_or_init(|| load_aws_config(&config.aws.region))
                .await;
            Arc::new(BedrockProvider::from_conf(sdk))
        }
        InferenceBackend::Mock => Arc::new(MockInferenceProvider::new(true)),
    };

    let storage: Arc<dyn ArtifactStorage> = match config.storage.backend {
        StorageBackend::S3 => {
            let sdk = sdk_config
                .get_or_init(|| load_aws_config(&config.aws.region))
                .await;
            Arc::new(S3Storage::new(
                aws_sdk_s3::Client::new(sdk),
                config.storage.bucket.clone(),
            ))
        }
        StorageBackend::Local => Arc::new(
            LocalStorage::new(&config.storage.local_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        path = %config.storage.local_path,
                        error = %e,
                        "Failed to initialize local storage"
                    );
                    AppError::InternalError(anyhow::Error::new(e))
                })?,
        ),
    };

    let metrics = PromptMetrics::new().map_err(|e| {
        tracing::error!(error = %e, "Failed to register metrics");
        AppError::InternalError(anyhow::Error::new(e))
    })?;

    tracing::info!(
        model = %config.models.model_id,
        region = %config.aws.region,
        inference = ?config.inference.backend,
        storage = %storage.location(),
        "Initialized prompt handler"
    );

    Ok(PromptHandler::new(
        config,
        inference,
        storage,
        Arc::new(metrics),
    ))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: PromptConfig) -> Result<Self, AppError> {
        let handler = build_handler(&config).await?;
        Self::with_handler(config.common.port, handler).await
    }

    /// Bind a listener for an already constructed handler (port 0 = random
    /// port for testing).
    pub async fn with_handler(port: u16, handler: PromptHandler) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Prompt service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            state: AppState {
                handler: Arc::new(handler),
            },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                e
            })
    }
}
