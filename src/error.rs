//! Unified HTTP error type for axum request handlers.
//!
//! [`AppError`] enumerates every error kind named in `spec.md` §7 and
//! carries its own fixed HTTP status and JSON body shape, so handlers return
//! `Result<T, AppError>` and propagate with `?` — the teacher's
//! `IntoResponse`-blanket-`From` pattern (`src/error.rs`), generalized from a
//! single always-500 variant to one variant per status code this gateway
//! actually returns.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid JSON body")]
    InvalidJson,

    #[error("invalid service")]
    UnknownService,

    #[error("unknown service family")]
    UnknownFamily,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("traffic locked: {mode} mode not allowed. Only 'legacy' mode is permitted.")]
    TrafficLocked { mode: String },

    #[error("backend service failed")]
    BackendUnavailable { dynamic: bool },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::InvalidJson | Self::UnknownService => StatusCode::BAD_REQUEST,
            Self::UnknownFamily => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::TrafficLocked { .. } => StatusCode::FORBIDDEN,
            Self::BackendUnavailable { dynamic: true } => StatusCode::SERVICE_UNAVAILABLE,
            Self::BackendUnavailable { dynamic: false } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::warn!(error = %self, "handler error");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
