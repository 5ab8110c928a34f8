//! Server error types and Axum response conversions.
//!
//! Every rejection renders as `{ "error": "..." }`. The sign-in client tells
//! a stale nonce from other verify failures by the message alone (see
//! [`is_nonce_rejection`]), so the messages below are part of the wire contract.

use crate::models::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// No pending nonce for the wallet (never issued, expired, or already used).
pub const NONCE_EXPIRED_MESSAGE: &str = "Nonce expired or invalid";
/// The signed text does not carry the issued nonce or names another wallet.
pub const NONCE_MISMATCH_MESSAGE: &str = "Nonce mismatch";
pub const INVALID_SIGNATURE_MESSAGE: &str = "Invalid signature";
pub const INVALID_WALLET_MESSAGE: &str = "Invalid wallet address";

/// Server-side failures of the `/api/auth/*` handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited")]
    RateLimited,
}

impl AppError {
    pub fn nonce_expired() -> Self {
        AppError::Unauthorized(NONCE_EXPIRED_MESSAGE.to_string())
    }

    pub fn nonce_mismatch() -> Self {
        AppError::Unauthorized(NONCE_MISMATCH_MESSAGE.to_string())
    }

    pub fn invalid_signature() -> Self {
        AppError::Unauthorized(INVALID_SIGNATURE_MESSAGE.to_string())
    }

    pub fn invalid_wallet() -> Self {
        AppError::BadRequest(INVALID_WALLET_MESSAGE.to_string())
    }
}

/// Whether a 401 `error` message means the nonce must be requested again.
pub fn is_nonce_rejection(message: &str) -> bool {
    message.to_lowercase().contains("nonce")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => {
                // Redis addresses and script errors stay in the log
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Internal(format!("Redis error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}
