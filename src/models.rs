//! Request and response models for the auth API.
//!
//! All models use serde for serialization/deserialization. The same wire types
//! are used by the server handlers and by the client library, so both sides
//! stay in lockstep. Storage models represent Redis data structures.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Wallet
// ============================================================================

/// Address of a connected wallet.
///
/// Opaque to the client. The server additionally requires it to be a base58
/// encoded Ed25519 public key (see [`crate::auth::verify`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WalletAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Auth Models
// ============================================================================

/// Request for a sign-in nonce.
#[derive(Debug, Serialize, Deserialize)]
pub struct NonceRequest {
    pub wallet: WalletAddress,
}

/// Response containing the nonce to embed in the challenge text.
#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String, // base64
}

/// Request to verify a signed challenge.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub wallet: WalletAddress,
    pub signature: Vec<u8>,
    pub message: String,
}

/// Response after successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub wallet: WalletAddress,
}

/// Response for the session status probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub wallet: Option<WalletAddress>,
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Nonce data as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNonce {
    pub nonce: String, // base64
    pub created_at: u64,
}

/// Session data as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub wallet: WalletAddress,
    pub created_at: u64,
}

/// Seconds since the Unix epoch.
pub fn unix_now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
