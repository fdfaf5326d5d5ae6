use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Why a supplied one-time code was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("no code on file")]
    NotFound,
    #[error("code expired")]
    Expired,
    #[error("code does not match")]
    Mismatch,
}

/// Delivery of a code to its destination failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Switch service error variants.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error("no block is active")]
    NothingActive,
    #[error("block state changed concurrently: {0}")]
    InvariantViolation(String),
    #[error("code could not be delivered")]
    Dispatch(#[from] DispatchError),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl SwitchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION",
            Self::Code(CodeError::NotFound) => "CODE_NOT_FOUND",
            Self::Code(CodeError::Expired) => "CODE_EXPIRED",
            Self::Code(CodeError::Mismatch) => "CODE_MISMATCH",
            Self::NothingActive => "NOTHING_ACTIVE",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::Dispatch(_) => "DISPATCH_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for SwitchError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::Code(_) | Self::NothingActive => StatusCode::BAD_REQUEST,
            Self::InvariantViolation(_) => StatusCode::CONFLICT,
            Self::Dispatch(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are expected client errors and already recorded by TraceLayer.
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = %e, kind = "INTERNAL", "internal error");
            }
            Self::Dispatch(e) => {
                tracing::error!(error = %e, kind = "DISPATCH_FAILED", "code delivery failed");
            }
            Self::InvariantViolation(detail) => {
                tracing::warn!(detail = %detail, kind = "INVARIANT_VIOLATION", "block transition rejected");
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
