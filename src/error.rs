use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use std::time::Duration;

/// Startup errors for the webhook service
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Logging setup failed: {0}")]
    LoggingError(String),
}

/// Helper type for Results that use WebhookError
pub type Result<T> = std::result::Result<T, WebhookError>;

/// Why an incoming payload could not be turned into a `WebhookEvent`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid body")]
    InvalidBody,

    #[error("missing parameters: {}", .missing.join(", "))]
    MissingParameters { missing: Vec<&'static str> },
}

/// Failure to run the deployment script at all, as opposed to a script
/// that ran and exited nonzero.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to start deployment script: {0}")]
    Spawn(#[source] io::Error),

    #[error("deployment script timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed to collect deployment script output: {0}")]
    Io(#[source] io::Error),
}

/// Every way a webhook request can fail, mapped onto an HTTP response
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid signature")]
    Unauthorized,

    /// The script ran and exited nonzero; carries its trimmed stderr.
    #[error("{0}")]
    CommandFailed(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Anything unanticipated; only its outermost message reaches the caller.
    #[error("{0}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::CommandFailed(_) | ApiError::Dispatch(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(ValidationError::InvalidBody) => {
                json!({ "error": "Invalid JSON data" })
            }
            ApiError::Validation(ValidationError::MissingParameters { missing }) => {
                json!({ "error": "Missing parameters", "missing": missing })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
