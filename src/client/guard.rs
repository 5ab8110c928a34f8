//! Legacy sign-in guard.
//!
//! Predates the nonce protocol: the wallet signs a static message, nothing is
//! sent to the server, and a per-wallet marker is kept in session-scoped
//! storage so the prompt is shown once per session. New code should use
//! [`AuthController`](crate::client::AuthController); the guard only proves the
//! wallet can sign, not that the server accepted it.

use crate::challenge::CHALLENGE_HEADER;
use crate::client::error::AuthError;
use crate::client::signer::WalletSigner;
use crate::client::store::{expiry_after, read_unexpired, Expiring, Storage};
use crate::models::WalletAddress;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Marker stored under `siws:{wallet}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiwsMarker {
    /// Expiry, epoch milliseconds.
    pub expires: u64,
}

impl Expiring for SiwsMarker {
    fn expires_at(&self) -> u64 {
        self.expires
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    AlreadySigned,
    Signed,
    AlreadyInFlight,
    Cancelled,
    /// [`SiwsGuard::reset`] ran while the prompt was open; nothing was stored.
    Discarded,
    Failed(AuthError),
}

#[derive(Debug, Default)]
struct Slot {
    /// Bumped by every reset.
    generation: u64,
    /// Generation of the prompt currently open, if any.
    inflight: Option<u64>,
}

pub struct SiwsGuard {
    storage: Arc<dyn Storage>,
    ttl: Duration,
    slot: Mutex<Slot>,
}

/// Frees the in-flight slot when the prompt ends, however it ends.
struct InflightRelease<'a> {
    guard: &'a SiwsGuard,
    generation: u64,
}

impl Drop for InflightRelease<'_> {
    fn drop(&mut self) {
        let mut slot = self.guard.lock();
        if slot.inflight == Some(self.generation) {
            slot.inflight = None;
        }
    }
}

fn marker_key(wallet: &WalletAddress) -> String {
    format!("siws:{}", wallet)
}

impl SiwsGuard {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self {
            storage,
            ttl,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    pub async fn is_signed(&self, wallet: &WalletAddress) -> bool {
        read_unexpired::<SiwsMarker>(self.storage.as_ref(), &marker_key(wallet))
            .await
            .is_some()
    }

    /// Prompt the wallet once per session.
    pub async fn ensure_signed(&self, signer: &dyn WalletSigner) -> GuardOutcome {
        let wallet = signer.address();

        let generation = {
            let mut slot = self.lock();
            if slot.inflight.is_some() {
                tracing::debug!(wallet = %wallet, "Guard signature already in flight");
                return GuardOutcome::AlreadyInFlight;
            }
            slot.inflight = Some(slot.generation);
            slot.generation
        };
        let _release = InflightRelease {
            guard: self,
            generation,
        };

        if self.is_signed(wallet).await {
            return GuardOutcome::AlreadySigned;
        }

        let signed = signer.sign_message(CHALLENGE_HEADER.as_bytes()).await.is_some();
        if !self.is_current(generation) {
            tracing::debug!(wallet = %wallet, "Guard reset during prompt, discarding");
            return GuardOutcome::Discarded;
        }
        if !signed {
            tracing::info!(wallet = %wallet, "User declined guard signature");
            return GuardOutcome::Cancelled;
        }

        let key = marker_key(wallet);
        let marker = SiwsMarker {
            expires: expiry_after(self.ttl),
        };
        let result = match serde_json::to_string(&marker) {
            Ok(json) => self.storage.set(&key, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(wallet = %wallet, error = %e, "Failed to store guard marker");
            return GuardOutcome::Failed(e.into());
        }

        // A reset that raced the write may have removed the marker already
        if !self.is_current(generation) {
            if let Err(e) = self.storage.remove(&key).await {
                tracing::warn!(wallet = %wallet, error = %e, "Failed to drop stale guard marker");
            }
            return GuardOutcome::Discarded;
        }
        GuardOutcome::Signed
    }

    /// Forget `wallet`'s marker (on disconnect). A prompt still open keeps the
    /// in-flight slot until it returns, and its result is discarded.
    pub async fn reset(&self, wallet: &WalletAddress) {
        self.lock().generation += 1;
        if let Err(e) = self.storage.remove(&marker_key(wallet)).await {
            tracing::warn!(wallet = %wallet, error = %e, "Failed to clear guard marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::signer::Ed25519Signer;
    use crate::client::store::MemoryStorage;
    use crate::client::store::now_millis;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingSigner {
        inner: Ed25519Signer,
        calls: AtomicUsize,
        decline: bool,
    }

    #[async_trait]
    impl WalletSigner for CountingSigner {
        fn address(&self) -> &WalletAddress {
            self.inner.address()
        }

        async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.decline {
                None
            } else {
                self.inner.sign_message(message).await
            }
        }
    }

    fn signer(decline: bool) -> CountingSigner {
        CountingSigner {
            inner: Ed25519Signer::generate(),
            calls: AtomicUsize::new(0),
            decline,
        }
    }

    fn guard() -> (Arc<MemoryStorage>, SiwsGuard) {
        let storage = Arc::new(MemoryStorage::new());
        let guard = SiwsGuard::new(storage.clone(), Duration::from_secs(3600));
        (storage, guard)
    }

    #[tokio::test]
    async fn test_signs_once_per_session() {
        let (storage, guard) = guard();
        let signer = signer(false);

        assert_eq!(guard.ensure_signed(&signer).await, GuardOutcome::Signed);
        assert_eq!(guard.ensure_signed(&signer).await, GuardOutcome::AlreadySigned);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);

        let key = format!("siws:{}", signer.address());
        let raw = storage.get(&key).await.unwrap().unwrap();
        let marker: SiwsMarker = serde_json::from_str(&raw).unwrap();
        assert!(marker.expires > now_millis());
    }

    #[tokio::test]
    async fn test_concurrent_calls_sign_once() {
        let (_, guard) = guard();
        let signer = signer(false);

        let (a, b) = tokio::join!(guard.ensure_signed(&signer), guard.ensure_signed(&signer));
        let mut outcomes = [a, b];
        outcomes.sort_by_key(|o| format!("{:?}", o));
        assert_eq!(outcomes, [GuardOutcome::AlreadyInFlight, GuardOutcome::Signed]);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_then_retry() {
        let (_, guard) = guard();
        let declining = signer(true);
        assert_eq!(guard.ensure_signed(&declining).await, GuardOutcome::Cancelled);
        assert!(!guard.is_signed(declining.address()).await);

        // flag released: the next prompt goes through
        assert_eq!(guard.ensure_signed(&declining).await, GuardOutcome::Cancelled);
        assert_eq!(declining.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_marker_prompts_again() {
        let (storage, guard) = guard();
        let signer = signer(false);
        let key = format!("siws:{}", signer.address());
        storage
            .set(&key, &serde_json::to_string(&SiwsMarker { expires: 1 }).unwrap())
            .await
            .unwrap();

        assert_eq!(guard.ensure_signed(&signer).await, GuardOutcome::Signed);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_forgets_wallet() {
        let (_, guard) = guard();
        let signer = signer(false);
        guard.ensure_signed(&signer).await;
        assert!(guard.is_signed(signer.address()).await);

        guard.reset(signer.address()).await;
        assert!(!guard.is_signed(signer.address()).await);
    }

    /// Holds the prompt open until released and counts open prompts.
    struct GatedSigner {
        inner: Ed25519Signer,
        open: AtomicUsize,
        max_open: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl WalletSigner for GatedSigner {
        fn address(&self) -> &WalletAddress {
            self.inner.address()
        }

        async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>> {
            let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_open.fetch_max(open, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            self.open.fetch_sub(1, Ordering::SeqCst);
            self.inner.sign_message(message).await
        }
    }

    #[tokio::test]
    async fn test_reset_during_prompt_discards_result() {
        let (_, guard) = guard();
        let guard = Arc::new(guard);
        let signer = Arc::new(GatedSigner {
            inner: Ed25519Signer::generate(),
            open: AtomicUsize::new(0),
            max_open: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        });

        let first = tokio::spawn({
            let guard = guard.clone();
            let signer = signer.clone();
            async move { guard.ensure_signed(signer.as_ref()).await }
        });
        signer.started.notified().await;

        guard.reset(signer.address()).await;

        // the stale prompt still holds the slot
        assert_eq!(
            guard.ensure_signed(signer.as_ref()).await,
            GuardOutcome::AlreadyInFlight
        );

        signer.release.notify_one();
        assert_eq!(first.await.unwrap(), GuardOutcome::Discarded);
        assert!(!guard.is_signed(signer.address()).await);
        assert_eq!(signer.max_open.load(Ordering::SeqCst), 1);

        // slot is free again and the next prompt counts
        let second = tokio::spawn({
            let guard = guard.clone();
            let signer = signer.clone();
            async move { guard.ensure_signed(signer.as_ref()).await }
        });
        signer.started.notified().await;
        signer.release.notify_one();
        assert_eq!(second.await.unwrap(), GuardOutcome::Signed);
        assert!(guard.is_signed(signer.address()).await);
        assert_eq!(signer.max_open.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_marker_does_not_wrap() {
        let storage = Arc::new(MemoryStorage::new());
        let guard = SiwsGuard::new(storage.clone(), Duration::MAX);
        let signer = signer(false);

        assert_eq!(guard.ensure_signed(&signer).await, GuardOutcome::Signed);
        assert!(guard.is_signed(signer.address()).await);
    }
}
