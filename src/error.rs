use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
///
/// Authentication and validation errors are terminal for the request or
/// connection attempt; persistence errors are terminal for that send only.
/// Push failures to individual connections never become an `AppError` — they
/// are logged and dropped at the delivery layer.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("authentication error: {0}")]
    Unauthenticated(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreUnavailable(_) | AppError::DeliveryFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-facing error message (without internal details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated(msg) => format!("Authentication failed: {}", msg),
            AppError::Jwt(_) => "Invalid or expired token".to_string(),
            AppError::InvalidRequest(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::StoreUnavailable(_) => "Message store unavailable".to_string(),
            AppError::DeliveryFailed(msg) => msg.clone(),
            AppError::Unknown(_) => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Jwt(_) => "JWT_ERROR",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::DeliveryFailed(_) => "DELIVERY_FAILED",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        }
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Unauthenticated(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        AppError::StoreUnavailable(msg.into())
    }

    pub fn delivery_failed(msg: impl Into<String>) -> Self {
        AppError::DeliveryFailed(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let error_code = self.error_code();

        // For server errors, don't expose internal details to the client
        let body = if status.is_server_error() {
            json!({
                "error": "Internal server error",
                "errorCode": error_code,
                "status": status.as_u16(),
            })
        } else {
            json!({
                "error": self.user_message(),
                "errorCode": error_code,
                "status": status.as_u16(),
            })
        };

        (status, axum::Json(body)).into_response()
    }
}
