// ============================================================
// Layer 1 — HTTP Errors
// ============================================================
// Every failure leaves the API as JSON: { "error": "..." }
//
//   400  malformed body, unknown store, bad horizon or flags
//   503  no trained model in the artifacts directory
//   500  anything else (logged, message passed through)

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::application::predict_use_case::PredictError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("no trained model is loaded; run `train` and restart the server")]
    ModelNotLoaded,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_)  => StatusCode::BAD_REQUEST,
            ApiError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_)    => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Model(e) => ApiError::Internal(format!("{e:#}")),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("rejected request: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let unknown: ApiError = PredictError::UnknownStore(7).into();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.to_string(), "unknown store 7");

        let horizon: ApiError = PredictError::InvalidHorizon { days: 50, horizon: 42 }.into();
        assert_eq!(horizon.status(), StatusCode::BAD_REQUEST);

        let model: ApiError = PredictError::Model(anyhow::anyhow!("boom")).into();
        assert_eq!(model.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::ModelNotLoaded.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
