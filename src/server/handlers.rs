// ============================================================
// Layer 1 — HTTP Handlers
// ============================================================
//   POST /predict → ForecastResponse
//   GET  /health  → status, version, model_loaded

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::application::predict_use_case::{ForecastRequest, ForecastResponse};
use crate::server::{error::ApiError, AppState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status:       String,
    pub version:      String,
    pub model_loaded: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status:       "ok".to_string(),
        version:      env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.predictor.is_some(),
    })
}

/// Forest inference is CPU-bound, so it runs on the blocking pool.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Json(request) = payload?;
    let predictor = state.predictor.clone().ok_or(ApiError::ModelNotLoaded)?;

    let response = tokio::task::spawn_blocking(move || predictor.predict(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {e}")))??;

    tracing::info!(
        "Forecast store {} for {} days",
        response.store,
        response.forecasts.len()
    );
    Ok(Json(response))
}
