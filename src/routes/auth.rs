//! Auth API endpoints.

use crate::auth::middleware::{check_rate_limit, AppState, AuthSession};
use crate::auth::session::{
    clear_session_cookie, generate_nonce, generate_session_token, session_cookie,
};
use crate::auth::verify::{verify_signature, wallet_public_key};
use crate::challenge::parse_challenge;
use crate::error::AppError;
use crate::models::{
    unix_now_secs, NonceRequest, NonceResponse, StatusResponse, StoredNonce, StoredSession,
    VerifyRequest, VerifyResponse,
};
use crate::storage;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

fn set_cookie(value: String) -> Result<[(header::HeaderName, HeaderValue); 1], AppError> {
    let value = HeaderValue::from_str(&value)
        .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
    Ok([(header::SET_COOKIE, value)])
}

/// POST /api/auth/nonce: Issue a single-use sign-in nonce
pub async fn request_nonce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<NonceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = state.redis_connection().await?;

    let rate_limit_key = format!("ratelimit:auth:{}", addr.ip());
    let allowed = check_rate_limit(
        &mut con,
        &rate_limit_key,
        state.config.rate_limit_auth_per_min,
        60,
    )
    .await
    .map_err(|e| AppError::Internal(format!("Rate limit check failed: {}", e)))?;

    if !allowed {
        let mut hasher = std::hash::DefaultHasher::new();
        addr.ip().hash(&mut hasher);
        let ip_hash = format!("{:x}", hasher.finish());
        tracing::warn!(action = "rate_limited", endpoint = "auth/nonce", ip_hash = %ip_hash, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    wallet_public_key(req.wallet.as_str())?;

    let nonce = generate_nonce();
    let stored = StoredNonce {
        nonce: nonce.clone(),
        created_at: unix_now_secs(),
    };
    storage::session::store_nonce(&mut con, &req.wallet, &stored, state.config.nonce_ttl_secs)
        .await?;

    tracing::debug!(action = "nonce_issued", wallet = %req.wallet, "Issued sign-in nonce");

    Ok(Json(NonceResponse { nonce }))
}

/// POST /api/auth/verify: Verify signed challenge and create session
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = parse_challenge(&req.message)
        .ok_or_else(|| AppError::BadRequest("Malformed challenge message".to_string()))?;
    if challenge.wallet != req.wallet.as_str() {
        tracing::warn!(action = "auth_failed", wallet = %req.wallet, "Challenge names another wallet");
        return Err(AppError::nonce_mismatch());
    }

    // Only the wallet's own signature may consume its pending nonce
    let valid = verify_signature(req.wallet.as_str(), req.message.as_bytes(), &req.signature)?;
    if !valid {
        tracing::warn!(action = "auth_failed", wallet = %req.wallet, "Invalid signature");
        return Err(AppError::invalid_signature());
    }

    let mut con = state.redis_connection().await?;

    let stored = storage::session::take_nonce(&mut con, &req.wallet)
        .await?
        .ok_or_else(AppError::nonce_expired)?;
    if challenge.nonce != stored.nonce {
        tracing::warn!(action = "auth_failed", wallet = %req.wallet, "Nonce mismatch");
        return Err(AppError::nonce_mismatch());
    }

    let token = generate_session_token();
    let session = StoredSession {
        token: token.clone(),
        wallet: req.wallet.clone(),
        created_at: unix_now_secs(),
    };
    storage::session::store_session(&mut con, &session, state.config.session_ttl_secs).await?;

    tracing::info!(action = "auth_success", wallet = %req.wallet, "Wallet authenticated");

    let cookie = set_cookie(session_cookie(
        &token,
        state.config.session_ttl_secs,
        state.config.cookie_secure,
    ))?;

    Ok((
        cookie,
        Json(VerifyResponse {
            wallet: session.wallet,
        }),
    ))
}

/// GET /api/auth/status: Report whether the caller holds a live session
pub async fn status(session: Option<AuthSession>) -> Json<StatusResponse> {
    Json(StatusResponse {
        authenticated: session.is_some(),
        wallet: session.map(|s| s.wallet),
    })
}

/// POST /api/auth/signout: Invalidate the current session, if any
pub async fn sign_out(
    session: Option<AuthSession>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(session) = session {
        let mut con = state.redis_connection().await?;
        storage::session::delete_session(&mut con, &session.token).await?;
        tracing::info!(action = "signout", wallet = %session.wallet, "Wallet signed out");
    }

    let cookie = set_cookie(clear_session_cookie(state.config.cookie_secure))?;
    Ok((StatusCode::NO_CONTENT, cookie))
}
