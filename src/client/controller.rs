//! Auth State Controller.
//!
//! Orchestrates the sign-in sequence (cache check, nonce, sign, verify) for
//! the currently connected wallet and publishes [`AuthState`] to observers.
//!
//! State machine, per controller:
//!
//! ```text
//!            authenticate()                 verify ok / cache hit
//!   Idle ────────────────────▶ Authenticating ─────────────────────▶ Authenticated
//!    ▲                              │                                    │
//!    └──── failure / cancel ────────┘                                    │
//!    └──────────────── sign_out() / disconnect() ────────────────────────┘
//! ```
//!
//! At most one attempt is in flight. Each attempt carries a number; results
//! of an attempt that is no longer the current one (the wallet was
//! disconnected or switched meanwhile) are discarded.

use crate::challenge::build_challenge;
use crate::client::api::AuthApi;
use crate::client::error::AuthError;
use crate::client::signer::WalletSigner;
use crate::client::store::{AuthCacheEntry, SessionStore, AUTH_CACHE_KEY};
use crate::models::WalletAddress;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Observable authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub wallet: Option<WalletAddress>,
    /// A sign-in attempt or status check is running.
    pub is_loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    Authenticating { attempt: u64 },
    Authenticated,
}

/// Result of [`AuthController::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Full nonce/sign/verify exchange succeeded.
    Authenticated(WalletAddress),
    /// A valid cache entry short-circuited the exchange.
    CachedSession(WalletAddress),
    AlreadyAuthenticated,
    /// Another attempt is pending; this call was dropped.
    AlreadyInFlight,
    NoWallet,
    /// The wallet returned no signature.
    Cancelled,
    /// The wallet was disconnected or switched before the attempt finished.
    Discarded,
    Failed(AuthError),
}

/// Hooks into the consuming application.
pub trait AuthEvents: Send + Sync {
    /// A sign-in step failed (toast).
    fn error(&self, _err: &AuthError) {}

    /// The user declined to sign.
    fn cancelled(&self) {}

    /// Sign-in completed; the application should reload authenticated views.
    fn refresh(&self) {}
}

/// [`AuthEvents`] that ignores everything.
#[derive(Debug, Default)]
pub struct NoopEvents;

impl AuthEvents for NoopEvents {}

struct Inner {
    signer: Option<Arc<dyn WalletSigner>>,
    phase: AuthPhase,
    last_attempt: u64,
}

/// Owns the sign-in state for one application session.
pub struct AuthController {
    api: AuthApi,
    store: SessionStore,
    events: Arc<dyn AuthEvents>,
    inner: Mutex<Inner>,
    state: watch::Sender<AuthState>,
}

/// Releases the in-flight slot when an attempt ends, however it ends.
struct AttemptGuard<'a> {
    controller: &'a AuthController,
    attempt: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.controller.lock();
        if inner.phase == (AuthPhase::Authenticating { attempt: self.attempt }) {
            inner.phase = AuthPhase::Idle;
            self.controller.state.send_modify(|s| s.is_loading = false);
        }
    }
}

impl AuthController {
    pub fn new(api: AuthApi, store: SessionStore) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            api,
            store,
            events: Arc::new(NoopEvents),
            inner: Mutex::new(Inner {
                signer: None,
                phase: AuthPhase::Idle,
                last_attempt: 0,
            }),
            state,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn AuthEvents>) -> Self {
        self.events = events;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> AuthPhase {
        self.lock().phase
    }

    /// Attach a wallet. Switching to a different address resets the state.
    pub fn connect(&self, signer: Arc<dyn WalletSigner>) {
        let mut inner = self.lock();
        let same_wallet = inner
            .signer
            .as_ref()
            .is_some_and(|s| s.address() == signer.address());

        tracing::debug!(action = "wallet_connected", wallet = %signer.address(), same_wallet);
        inner.signer = Some(signer);
        if !same_wallet {
            inner.phase = AuthPhase::Idle;
            self.state.send_replace(AuthState::default());
        }
    }

    /// Detach the wallet: state, in-flight slot, cache and saved session cookie
    /// are all cleared.
    pub async fn disconnect(&self) {
        {
            let mut inner = self.lock();
            if let Some(signer) = inner.signer.take() {
                tracing::debug!(action = "wallet_disconnected", wallet = %signer.address());
            }
            inner.phase = AuthPhase::Idle;
            self.state.send_replace(AuthState::default());
        }
        self.clear_cache().await;
        self.forget_session().await;
    }

    /// Sign in the connected wallet. Never fails; see [`AuthOutcome`].
    pub async fn authenticate(&self) -> AuthOutcome {
        let (signer, attempt) = {
            let mut inner = self.lock();
            let signer = match (&inner.signer, inner.phase) {
                (None, _) => return AuthOutcome::NoWallet,
                (Some(_), AuthPhase::Authenticating { attempt }) => {
                    tracing::debug!(attempt, "Authentication already in flight, ignoring");
                    return AuthOutcome::AlreadyInFlight;
                }
                (Some(_), AuthPhase::Authenticated) => return AuthOutcome::AlreadyAuthenticated,
                (Some(signer), AuthPhase::Idle) => signer.clone(),
            };
            inner.last_attempt += 1;
            let attempt = inner.last_attempt;
            inner.phase = AuthPhase::Authenticating { attempt };
            (signer, attempt)
        };
        let _guard = AttemptGuard {
            controller: self,
            attempt,
        };
        let wallet = signer.address().clone();

        let cached = self
            .store
            .read(AUTH_CACHE_KEY)
            .await
            .filter(|entry| entry.belongs_to(wallet.as_str()));
        if cached.is_some() {
            return if self.commit(attempt, wallet.clone()) {
                tracing::debug!(action = "auth_cached", wallet = %wallet, "Using cached sign-in");
                AuthOutcome::CachedSession(wallet)
            } else {
                AuthOutcome::Discarded
            };
        }

        if !self.if_current(attempt, |_| self.state.send_modify(|s| s.is_loading = true)) {
            return AuthOutcome::Discarded;
        }

        match self.exchange(signer.as_ref(), &wallet).await {
            Ok((signature, verified)) => {
                let entry = AuthCacheEntry::new(&signature, wallet.as_str(), self.store.ttl());
                if let Err(e) = self.store.write(AUTH_CACHE_KEY, &entry).await {
                    tracing::warn!(error = %e, "Failed to cache sign-in");
                }

                if !self.commit(attempt, verified.clone()) {
                    self.forget_entry(&entry).await;
                    return AuthOutcome::Discarded;
                }

                if let Some(token) = self.api.session_token() {
                    if let Err(e) = self.store.save_session_token(&token).await {
                        tracing::warn!(error = %e, "Failed to persist session cookie");
                    }
                }

                tracing::info!(action = "auth_success", wallet = %verified, "Wallet signed in");
                self.events.refresh();
                AuthOutcome::Authenticated(verified)
            }
            Err(_) if !self.is_current(attempt) => AuthOutcome::Discarded,
            Err(AuthError::UserCancelledSigning) => {
                tracing::info!(action = "auth_cancelled", wallet = %wallet, "User declined to sign");
                self.events.cancelled();
                AuthOutcome::Cancelled
            }
            Err(err) => {
                if err == AuthError::NonceExpiredOrInvalid {
                    self.clear_cache().await;
                }
                tracing::warn!(action = "auth_failed", wallet = %wallet, error = %err, "Sign-in failed");
                self.events.error(&err);
                AuthOutcome::Failed(err)
            }
        }
    }

    /// nonce -> sign -> verify, strictly in order.
    async fn exchange(
        &self,
        signer: &dyn WalletSigner,
        wallet: &WalletAddress,
    ) -> Result<(Vec<u8>, WalletAddress), AuthError> {
        let nonce = self.api.request_nonce(wallet).await?;
        let message = build_challenge(wallet, &nonce);

        let signature = signer
            .sign_message(message.as_bytes())
            .await
            .ok_or(AuthError::UserCancelledSigning)?;

        let verified = self.api.verify(wallet, &signature, &message).await?;
        Ok((signature, verified.wallet))
    }

    /// Move `attempt` to Authenticated, unless it was superseded.
    fn commit(&self, attempt: u64, wallet: WalletAddress) -> bool {
        self.if_current(attempt, |inner| {
            inner.phase = AuthPhase::Authenticated;
            self.state.send_replace(AuthState {
                is_authenticated: true,
                wallet: Some(wallet),
                is_loading: false,
            });
        })
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.lock().phase == (AuthPhase::Authenticating { attempt })
    }

    fn if_current(&self, attempt: u64, f: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.lock();
        if inner.phase != (AuthPhase::Authenticating { attempt }) {
            return false;
        }
        f(&mut inner);
        true
    }

    /// Query the server session. Failures leave the state unauthenticated.
    pub async fn check_auth_status(&self) -> AuthState {
        self.state.send_modify(|s| s.is_loading = true);
        self.restore_session().await;

        let result = self.api.status().await;

        let mut inner = self.lock();
        let in_flight = matches!(inner.phase, AuthPhase::Authenticating { .. });
        match result {
            Ok(status) if !in_flight => {
                let connected = inner.signer.as_ref().map(|s| s.address().clone());
                let matches_wallet = match (&connected, &status.wallet) {
                    (Some(connected), Some(server)) => connected == server,
                    (None, _) => true,
                    (Some(_), None) => false,
                };

                if status.authenticated && matches_wallet {
                    inner.phase = AuthPhase::Authenticated;
                    self.state.send_replace(AuthState {
                        is_authenticated: true,
                        wallet: status.wallet,
                        is_loading: false,
                    });
                } else {
                    inner.phase = AuthPhase::Idle;
                    self.state.send_replace(AuthState::default());
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(action = "status_check_failed", error = %e, "Auth status check failed");
                if !in_flight {
                    self.state.send_modify(|s| s.is_loading = false);
                }
            }
        }
        drop(inner);

        self.state()
    }

    /// Sign out locally and on the server. Local state is cleared even if the
    /// server call fails.
    pub async fn sign_out(&self) {
        self.restore_session().await;
        if let Err(e) = self.api.sign_out().await {
            tracing::warn!(action = "signout_failed", error = %e, "Server sign-out failed");
        }
        self.clear_cache().await;
        self.forget_session().await;

        let mut inner = self.lock();
        inner.phase = AuthPhase::Idle;
        self.state.send_replace(AuthState::default());
        tracing::info!(action = "signout", "Signed out");
    }

    async fn clear_cache(&self) {
        if let Err(e) = self.store.clear(AUTH_CACHE_KEY).await {
            tracing::warn!(error = %e, "Failed to clear cached sign-in");
        }
    }

    /// Hand a session cookie saved by an earlier run to the HTTP client.
    async fn restore_session(&self) {
        if let Some(token) = self.store.load_session_token().await {
            self.api.restore_session_token(&token);
        }
    }

    async fn forget_session(&self) {
        if let Err(e) = self.store.forget_session_token().await {
            tracing::warn!(error = %e, "Failed to clear saved session cookie");
        }
    }

    /// Remove `entry` if it is still the cached one.
    async fn forget_entry(&self, entry: &AuthCacheEntry) {
        if self.store.read(AUTH_CACHE_KEY).await.as_ref() == Some(entry) {
            self.clear_cache().await;
        }
    }
}

impl std::fmt::Debug for AuthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("base_url", &self.api.base_url())
            .field("phase", &self.phase())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::{MemoryStorage, DEFAULT_CACHE_TTL};
    use crate::client::signer::Ed25519Signer;
    use crate::config::ClientConfig;

    // Nothing listens on port 1, so any network call fails fast.
    fn offline_controller() -> (AuthController, SessionStore) {
        let api = AuthApi::new(&ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            http_timeout_secs: 2,
            ..Default::default()
        });
        let store = SessionStore::new(Arc::new(MemoryStorage::new()), DEFAULT_CACHE_TTL);
        (AuthController::new(api, store.clone()), store)
    }

    #[tokio::test]
    async fn test_authenticate_without_wallet() {
        let (controller, _) = offline_controller();
        assert_eq!(controller.authenticate().await, AuthOutcome::NoWallet);
        assert_eq!(controller.phase(), AuthPhase::Idle);
    }

    #[tokio::test]
    async fn test_cache_hit_needs_no_network() {
        let (controller, store) = offline_controller();
        let signer = Arc::new(Ed25519Signer::generate());
        let wallet = signer.address().clone();
        store
            .write(
                AUTH_CACHE_KEY,
                &AuthCacheEntry::new(&[1, 2, 3], wallet.as_str(), DEFAULT_CACHE_TTL),
            )
            .await
            .unwrap();

        controller.connect(signer);
        assert_eq!(
            controller.authenticate().await,
            AuthOutcome::CachedSession(wallet.clone())
        );
        assert_eq!(
            controller.state(),
            AuthState {
                is_authenticated: true,
                wallet: Some(wallet),
                is_loading: false,
            }
        );
        assert_eq!(controller.authenticate().await, AuthOutcome::AlreadyAuthenticated);
    }

    #[tokio::test]
    async fn test_cache_entry_for_other_wallet_is_ignored() {
        let (controller, store) = offline_controller();
        store
            .write(
                AUTH_CACHE_KEY,
                &AuthCacheEntry::new(&[1], "someone-else", DEFAULT_CACHE_TTL),
            )
            .await
            .unwrap();

        controller.connect(Arc::new(Ed25519Signer::generate()));
        let outcome = controller.authenticate().await;
        assert!(matches!(
            outcome,
            AuthOutcome::Failed(AuthError::NonceRequestFailed(_))
        ));
        // entry for the other wallet is left alone
        assert!(store.read(AUTH_CACHE_KEY).await.is_some());
    }

    #[tokio::test]
    async fn test_failure_releases_guard() {
        let (controller, _) = offline_controller();
        controller.connect(Arc::new(Ed25519Signer::generate()));

        for _ in 0..2 {
            let outcome = controller.authenticate().await;
            assert!(matches!(outcome, AuthOutcome::Failed(_)));
            assert_eq!(controller.phase(), AuthPhase::Idle);
            assert!(!controller.state().is_loading);
        }
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache_when_server_unreachable() {
        let (controller, store) = offline_controller();
        let signer = Arc::new(Ed25519Signer::generate());
        store
            .write(
                AUTH_CACHE_KEY,
                &AuthCacheEntry::new(&[1], signer.address().as_str(), DEFAULT_CACHE_TTL),
            )
            .await
            .unwrap();
        controller.connect(signer);
        controller.authenticate().await;
        assert!(controller.state().is_authenticated);

        controller.sign_out().await;
        assert_eq!(controller.state(), AuthState::default());
        assert_eq!(controller.phase(), AuthPhase::Idle);
        assert!(store.read(AUTH_CACHE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_status_check_failure_fails_open() {
        let (controller, _) = offline_controller();
        let state = controller.check_auth_status().await;
        assert_eq!(state, AuthState::default());
    }

    #[tokio::test]
    async fn test_switching_wallet_resets_state() {
        let (controller, store) = offline_controller();
        let first = Arc::new(Ed25519Signer::generate());
        store
            .write(
                AUTH_CACHE_KEY,
                &AuthCacheEntry::new(&[1], first.address().as_str(), DEFAULT_CACHE_TTL),
            )
            .await
            .unwrap();
        controller.connect(first.clone());
        controller.authenticate().await;
        assert!(controller.state().is_authenticated);

        // reconnecting the same wallet keeps the session
        controller.connect(first);
        assert!(controller.state().is_authenticated);

        controller.connect(Arc::new(Ed25519Signer::generate()));
        assert_eq!(controller.state(), AuthState::default());
        assert_eq!(controller.phase(), AuthPhase::Idle);
    }
}
