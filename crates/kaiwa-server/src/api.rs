//! Shared API error type and small info handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kaiwa_voice::{VoiceError, VoiceInfo};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
///
/// The response body carries the failure message under a `detail` key;
/// upstream provider failures surface their message verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(#[from] VoiceError),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "detail": self.to_string()
        }));

        (status, body).into_response()
    }
}

/// Response body for the voice catalog endpoint.
#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
}

/// Handler for `GET /api/voices` — lists the synthesis voices available
/// to the configured account.
pub async fn voices_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let voices = state.tts.voices().await?;
    Ok(Json(VoicesResponse { voices }))
}
