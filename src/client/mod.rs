//! Client side of the wallet sign-in protocol.
//!
//! ```rust,no_run
//! use predikt_auth::client::{AuthController, AuthApi, Ed25519Signer, FileStorage, SessionStore};
//! use predikt_auth::config::ClientConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = ClientConfig::default();
//! let store = SessionStore::new(
//!     Arc::new(FileStorage::new(&config.state_dir)),
//!     Duration::from_secs(config.cache_ttl_secs),
//! );
//! let controller = AuthController::new(AuthApi::new(&config), store);
//!
//! controller.connect(Arc::new(Ed25519Signer::generate()));
//! let outcome = controller.authenticate().await;
//! println!("{:?} -> {:?}", outcome, controller.state());
//! # }
//! ```

pub mod api;
pub mod controller;
pub mod error;
pub mod guard;
pub mod signer;
pub mod store;

pub use api::AuthApi;
pub use controller::{AuthController, AuthEvents, AuthOutcome, AuthPhase, AuthState, NoopEvents};
pub use error::{AuthError, StorageError};
pub use guard::{GuardOutcome, SiwsGuard, SiwsMarker};
pub use signer::{Ed25519Signer, KeypairError, WalletSigner};
pub use store::{
    AuthCacheEntry, FileStorage, MemoryStorage, SavedSession, SessionStore, Storage,
    AUTH_CACHE_KEY, DEFAULT_CACHE_TTL, SESSION_TOKEN_KEY,
};
