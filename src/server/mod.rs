// ============================================================
// Layer 1 — HTTP Server
// ============================================================
// The prediction API, a second presentation surface next to
// the CLI. Handlers only translate HTTP to use-case calls.
//
//   Router
//     ├── GET  /health
//     └── POST /predict
//   layers: TraceLayer (request spans), permissive CORS
//
// The server still starts when no model has been trained:
// /health reports model_loaded = false and /predict answers 503.

/// Route handlers
pub mod handlers;

/// ApiError → JSON response
pub mod error;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::application::predict_use_case::PredictUseCase;
use crate::infra::checkpoint::ArtifactStore;

/// Shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub predictor: Option<Arc<PredictUseCase>>,
}

impl AppState {
    pub fn new(predictor: Option<PredictUseCase>) -> Self {
        Self { predictor: predictor.map(Arc::new) }
    }

    /// Load the forecaster if the artefacts exist; a broken artefact is an error.
    pub fn load(config_path: &Path, artifacts_dir: &Path) -> Result<Self> {
        if !ArtifactStore::new(artifacts_dir).has_forest() {
            tracing::warn!(
                "No trained random forest in '{}'; /predict will answer 503",
                artifacts_dir.display()
            );
            return Ok(Self::new(None));
        }
        let predictor = PredictUseCase::load(config_path, artifacts_dir)?;
        Ok(Self::new(Some(predictor)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `host:port`; the host may be an IP address or a name such as localhost.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Cannot bind {host}:{port}"))
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let listener = bind(host, port).await?;
    let addr = listener.local_addr()?;

    tracing::info!("rossmann-forecast v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    axum::serve(listener, router(state)).await.context("Server error")?;
    Ok(())
}
