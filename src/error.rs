use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for all API failures.
///
/// Ownership failures are not errors: they come back as `success: false`
/// bodies. Everything here is either bad input or an internal fault, and
/// each variant maps to an HTTP status with a JSON `error`/`details` body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid duration: {reason}")]
    InvalidDuration { reason: String },

    #[error("Invalid timeout: {reason}")]
    InvalidTimeout { reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Mutex does not exist: {name}")]
    UnknownMutex { name: String },

    #[error("Mutex is not currently held: {name}")]
    MutexNotHeld { name: String },

    #[error("Stored value for {key} is not an integer: {value:?}")]
    CorruptCounter { key: String, value: String },

    #[error("Counter overflow on {key}")]
    CounterOverflow { key: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidDuration { .. } => (StatusCode::BAD_REQUEST, "Invalid duration"),
            AppError::InvalidTimeout { .. } => (StatusCode::BAD_REQUEST, "Invalid timeout"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid input"),
            AppError::UnknownMutex { .. } => (StatusCode::BAD_REQUEST, "Unknown mutex"),
            AppError::MutexNotHeld { .. } => (StatusCode::BAD_REQUEST, "Mutex not held"),
            AppError::CorruptCounter { .. } => (StatusCode::BAD_REQUEST, "Corrupt counter value"),
            AppError::CounterOverflow { .. } => (StatusCode::BAD_REQUEST, "Counter overflow"),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "JSON parsing error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
