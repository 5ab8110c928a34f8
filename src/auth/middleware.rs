//! Axum extractors for session cookies and rate limiting.

use crate::auth::session::session_token_from_cookie_header;
use crate::config::Config;
use crate::error::AppError;
use crate::models::WalletAddress;
use crate::storage;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use redis::AsyncCommands;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub redis: redis::Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn redis_connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))
    }
}

/// Authenticated session extractor.
///
/// Reads the session token from the `predikt_session` cookie.
/// Returns 401 Unauthorized if missing or unknown.
#[derive(Debug)]
pub struct AuthSession {
    pub wallet: WalletAddress,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(session_token_from_cookie_header)
            .ok_or_else(|| AppError::Unauthorized("Missing session cookie".to_string()))?
            .to_string();

        let mut con = state.redis_connection().await?;

        let session = storage::session::get_session(&mut con, &token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthSession {
            wallet: session.wallet,
            token,
        })
    }
}

/// Optional session: `None` when the cookie is missing or the session is gone.
///
/// Infrastructure failures still reject the request.
impl OptionalFromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <AuthSession as FromRequestParts<AppState>>::from_request_parts(parts, state).await {
            Ok(session) => Ok(Some(session)),
            Err(AppError::Unauthorized(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Check rate limit using Redis INCR with TTL.
///
/// # Arguments
/// * `con` - Redis connection
/// * `key` - Rate limit key (e.g., "ratelimit:auth:127.0.0.1")
/// * `max` - Maximum requests allowed in window
/// * `window_secs` - Time window in seconds
///
/// # Returns
/// * `Ok(true)` if under limit
/// * `Ok(false)` if limit exceeded
pub async fn check_rate_limit<C>(
    con: &mut C,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let count: u32 = con.incr(key, 1).await?;

    // First hit opens the window
    if count == 1 {
        con.expire::<_, ()>(key, window_secs as i64).await?;
    }

    Ok(count <= max)
}
