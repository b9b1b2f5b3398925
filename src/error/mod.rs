use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised inside the real-time core.
///
/// None of these ever reach the HTTP layer: they are either reported to the
/// originating connection as an `error` envelope or logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Failed to decode message.")]
    Decode,

    #[error("Failed to decode access token.")]
    InvalidToken,

    #[error("Unknown connection: {0}")]
    UnknownConnection(Uuid),

    #[error("Connection already authenticated: {0}")]
    AlreadyBound(Uuid),

    #[error("Connection not writable: {0}")]
    TransportUnavailable(Uuid),
}

#[derive(Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, client_msg, log_msg)
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), msg.clone()),
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone(), msg.clone()),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if is_production() {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, client_msg, log_msg)
            }
            AppError::Database(e) => {
                let log_msg = e.to_string();
                let client_msg = if is_production() {
                    "Service temporarily unavailable".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, client_msg, log_msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), message = %log_message, "API error");
        } else {
            tracing::debug!(status = %status.as_u16(), message = %log_message, "API request rejected");
        }

        let body = ErrorResponse {
            status: status.as_u16(),
            message: client_message,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
