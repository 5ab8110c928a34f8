//! Wallet signing capability.
//!
//! The controller only needs two things from a connected wallet: its address
//! and the ability to sign bytes. Wallets that decline or do not support
//! message signing return `None` rather than an error.

use crate::models::WalletAddress;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use std::path::Path;
use zeroize::Zeroizing;

/// A connected wallet able to sign arbitrary messages.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> &WalletAddress;

    /// Sign `message`. `None` means the user declined or the wallet cannot sign messages.
    async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>>;
}

#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid keypair file: {0}")]
    Invalid(String),
}

/// Local Ed25519 keypair acting as a Solana wallet.
pub struct Ed25519Signer {
    key: SigningKey,
    address: WalletAddress,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        let address = WalletAddress::new(bs58::encode(key.verifying_key().as_bytes()).into_string());
        Self { key, address }
    }

    /// Fresh random keypair.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::fill(&mut seed[..]);
        Self::new(SigningKey::from_bytes(&seed))
    }

    /// Parse the Solana CLI keypair format: a JSON array of 64 bytes
    /// (32-byte secret followed by the 32-byte public key).
    pub fn from_keypair_json(json: &str) -> Result<Self, KeypairError> {
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(json).map_err(|e| KeypairError::Invalid(e.to_string()))?,
        );
        let array: &[u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            KeypairError::Invalid(format!("expected 64 bytes, got {}", bytes.len()))
        })?;
        let key = SigningKey::from_keypair_bytes(array)
            .map_err(|e| KeypairError::Invalid(e.to_string()))?;
        Ok(Self::new(key))
    }

    pub fn to_keypair_json(&self) -> String {
        let bytes = Zeroizing::new(self.key.to_keypair_bytes());
        serde_json::Value::from(bytes.to_vec()).to_string()
    }

    pub async fn load(path: &Path) -> Result<Self, KeypairError> {
        let json = Zeroizing::new(tokio::fs::read_to_string(path).await?);
        Self::from_keypair_json(&json)
    }

    pub async fn save(&self, path: &Path) -> Result<(), KeypairError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = Zeroizing::new(self.to_keypair_json());
        tokio::fs::write(path, json.as_bytes()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl WalletSigner for Ed25519Signer {
    fn address(&self) -> &WalletAddress {
        &self.address
    }

    async fn sign_message(&self, message: &[u8]) -> Option<Vec<u8>> {
        Some(self.key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify::verify_signature;

    #[tokio::test]
    async fn test_signature_verifies_against_address() {
        let signer = Ed25519Signer::generate();
        let signature = signer.sign_message(b"hello").await.unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(signer.address().as_str(), b"hello", &signature).unwrap());
    }

    #[test]
    fn test_keypair_json_roundtrip_keeps_address() {
        let signer = Ed25519Signer::generate();
        let json = signer.to_keypair_json();
        let restored = Ed25519Signer::from_keypair_json(&json).unwrap();
        assert_eq!(restored.address(), signer.address());
    }

    #[test]
    fn test_keypair_json_rejects_wrong_length() {
        let err = Ed25519Signer::from_keypair_json("[1,2,3]").unwrap_err();
        assert!(matches!(err, KeypairError::Invalid(_)));
    }

    #[test]
    fn test_keypair_json_rejects_mismatched_public_key() {
        let signer = Ed25519Signer::generate();
        let mut bytes = signer.key.to_keypair_bytes();
        bytes[40] ^= 0xff;
        let json = serde_json::Value::from(bytes.to_vec()).to_string();
        assert!(Ed25519Signer::from_keypair_json(&json).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = Ed25519Signer::generate();
        let debug = format!("{:?}", signer);
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains(signer.address().as_str()));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("id.json");
        let signer = Ed25519Signer::generate();
        signer.save(&path).await.unwrap();

        let loaded = Ed25519Signer::load(&path).await.unwrap();
        assert_eq!(loaded.address(), signer.address());
    }
}
