use axum::{http::StatusCode, Json};
use thiserror::Error;

use crate::server::types::ErrorResponse;

#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing or invalid principal")]
    Unauthorized,

    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("Session '{0}' belongs to another user")]
    Forbidden(String),

    #[error("Session '{0}' already exists")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session has no artifact to accept")]
    NoArtifact,

    #[error("Session is already committed as {0}")]
    Terminal(i64),

    #[error("Regeneration limit ({0}) reached")]
    RegenerationLimit(u32),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Commit failed: {0}")]
    Commit(String),
}

impl CoachError {
    /// HTTP status for a control request that failed with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoachError::Validation(_) => StatusCode::BAD_REQUEST,
            CoachError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoachError::NotFound(_) => StatusCode::NOT_FOUND,
            CoachError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoachError::AlreadyExists(_)
            | CoachError::Conflict(_)
            | CoachError::NoArtifact
            | CoachError::Terminal(_)
            | CoachError::RegenerationLimit(_) => StatusCode::CONFLICT,
            CoachError::Generation(_) | CoachError::Commit(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable code for programmatic handling, shared by HTTP bodies and stream events.
    pub fn code(&self) -> &'static str {
        match self {
            CoachError::Validation(_) => "INVALID_REQUEST",
            CoachError::Unauthorized => "UNAUTHORIZED",
            CoachError::NotFound(_) => "SESSION_NOT_FOUND",
            CoachError::Forbidden(_) => "FORBIDDEN",
            CoachError::AlreadyExists(_) => "SESSION_EXISTS",
            CoachError::Conflict(_) => "CONFLICT",
            CoachError::NoArtifact => "NO_ARTIFACT",
            CoachError::Terminal(_) => "SESSION_COMMITTED",
            CoachError::RegenerationLimit(_) => "REGENERATION_LIMIT",
            CoachError::Generation(_) => "GENERATION_FAILED",
            CoachError::Commit(_) => "COMMIT_FAILED",
        }
    }

    /// Convert into the `(status, body)` pair returned by the HTTP handlers.
    pub fn into_http(self) -> (StatusCode, Json<ErrorResponse>) {
        let status = self.status_code();
        let body = ErrorResponse::with_code(self.to_string(), self.code());
        (status, Json(body))
    }
}

pub type Result<T> = std::result::Result<T, CoachError>;
