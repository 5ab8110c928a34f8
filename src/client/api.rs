//! HTTP client for the `/api/auth/*` endpoints.
//!
//! Covers the challenge request (`nonce`), the verifier (`verify`) and the
//! session probes (`status`, `signout`). The session cookie set by `verify`
//! is kept in the client's cookie jar and replayed automatically; callers that
//! outlive the process persist it through [`AuthApi::session_token`] and
//! [`AuthApi::restore_session_token`].

use crate::auth::session::{session_token_from_cookie_header, SESSION_COOKIE};
use crate::client::error::AuthError;
use crate::config::{ClientConfig, RetryPolicy};
use crate::error::is_nonce_rejection;
use crate::models::{
    ErrorBody, NonceRequest, NonceResponse, StatusResponse, VerifyRequest, VerifyResponse,
    WalletAddress,
};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

/// Failure of a single HTTP exchange, before mapping to [`AuthError`].
#[derive(Debug)]
enum RequestFailure {
    Transport(String),
    Status { status: StatusCode, message: String },
}

impl RequestFailure {
    fn is_retryable(&self) -> bool {
        match self {
            RequestFailure::Transport(_) => true,
            RequestFailure::Status { status, .. } => status.is_server_error(),
        }
    }

    fn message(self) -> String {
        match self {
            RequestFailure::Transport(msg) => msg,
            RequestFailure::Status { message, .. } => message,
        }
    }
}

/// Typed client for the auth endpoints.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    base_url: String,
    nonce_retry: RetryPolicy,
}

impl AuthApi {
    pub fn new(config: &ClientConfig) -> Self {
        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http,
            cookies,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            nonce_retry: config.nonce_retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn cookie_url(&self) -> Option<Url> {
        Url::parse(&self.base_url).ok()
    }

    /// Session token the server set on this client, if any.
    pub fn session_token(&self) -> Option<String> {
        let url = self.cookie_url()?;
        let header = self.cookies.cookies(&url)?;
        session_token_from_cookie_header(header.to_str().ok()?).map(str::to_string)
    }

    /// Replay a session token saved by an earlier run on subsequent requests.
    pub fn restore_session_token(&self, token: &str) {
        match self.cookie_url() {
            Some(url) => self
                .cookies
                .add_cookie_str(&format!("{}={}; Path=/", SESSION_COOKIE, token), &url),
            None => tracing::warn!(base_url = %self.base_url, "Cannot restore session cookie"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/auth/{}", self.base_url, path)
    }

    /// Request a fresh nonce for `wallet`.
    ///
    /// Transport errors and 5xx responses are retried according to the
    /// configured [`RetryPolicy`]; client errors never are.
    pub async fn request_nonce(&self, wallet: &WalletAddress) -> Result<String, AuthError> {
        let body = NonceRequest {
            wallet: wallet.clone(),
        };

        let mut attempt = 1;
        loop {
            match self.post_json::<_, NonceResponse>("nonce", &body).await {
                Ok(resp) => return Ok(resp.nonce),
                Err(failure) if failure.is_retryable() && attempt < self.nonce_retry.max_attempts => {
                    let delay = self.nonce_retry.backoff(attempt);
                    tracing::debug!(
                        action = "nonce_retry",
                        wallet = %wallet,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = ?failure,
                        "Retrying nonce request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(AuthError::NonceRequestFailed(failure.message())),
            }
        }
    }

    /// Submit a signed challenge.
    pub async fn verify(
        &self,
        wallet: &WalletAddress,
        signature: &[u8],
        message: &str,
    ) -> Result<VerifyResponse, AuthError> {
        let body = VerifyRequest {
            wallet: wallet.clone(),
            signature: signature.to_vec(),
            message: message.to_string(),
        };

        self.post_json("verify", &body)
            .await
            .map_err(|failure| match failure {
                RequestFailure::Status { status, message }
                    if status == StatusCode::UNAUTHORIZED && is_nonce_rejection(&message) =>
                {
                    AuthError::NonceExpiredOrInvalid
                }
                other => AuthError::VerificationFailed(other.message()),
            })
    }

    /// Ask the server whether this client holds a live session.
    pub async fn status(&self) -> Result<StatusResponse, AuthError> {
        let response = self
            .http
            .get(self.url("status"))
            .send()
            .await
            .map_err(|e| AuthError::StatusCheckFailed(e.to_string()))?;

        Self::decode(response)
            .await
            .map_err(|f| AuthError::StatusCheckFailed(f.message()))
    }

    /// Invalidate the server-side session.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.url("signout"))
            .send()
            .await
            .map_err(|e| AuthError::SignOutFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::SignOutFailed(
                Self::failure(response).await.message(),
            ))
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestFailure>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RequestFailure::Transport(e.to_string()))?;

        Self::decode(response).await
    }

    async fn decode<T>(response: reqwest::Response) -> Result<T, RequestFailure>
    where
        T: serde::de::DeserializeOwned,
    {
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RequestFailure::Transport(format!("Invalid response body: {}", e)))
    }

    /// Prefer the server's `{ "error": ... }` message, fall back to the status text.
    async fn failure(response: reqwest::Response) -> RequestFailure {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };
        RequestFailure::Status { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let api = AuthApi::new(&ClientConfig {
            base_url: "https://predikt.example/".to_string(),
            ..Default::default()
        });
        assert_eq!(api.base_url(), "https://predikt.example");
        assert_eq!(api.url("nonce"), "https://predikt.example/api/auth/nonce");
    }

    #[test]
    fn test_session_token_restore() {
        let api = AuthApi::new(&ClientConfig {
            base_url: "http://127.0.0.1:3000".to_string(),
            ..Default::default()
        });
        assert_eq!(api.session_token(), None);

        api.restore_session_token("tok-123");
        assert_eq!(api.session_token().as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_retryable_failures() {
        assert!(RequestFailure::Transport("timeout".into()).is_retryable());
        assert!(RequestFailure::Status {
            status: StatusCode::BAD_GATEWAY,
            message: String::new()
        }
        .is_retryable());
        assert!(!RequestFailure::Status {
            status: StatusCode::BAD_REQUEST,
            message: String::new()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_nonce_request() {
        // Port 1 is never listening
        let api = AuthApi::new(&ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            http_timeout_secs: 2,
            ..Default::default()
        });
        let err = api.request_nonce(&"w".into()).await.unwrap_err();
        assert!(matches!(err, AuthError::NonceRequestFailed(_)));
    }
}
