//! Ed25519 signature verification for Solana wallet addresses.

use crate::error::AppError;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Decode a base58 wallet address into an Ed25519 public key.
pub fn wallet_public_key(wallet: &str) -> Result<VerifyingKey, AppError> {
    let bytes = bs58::decode(wallet)
        .into_vec()
        .map_err(|_| AppError::invalid_wallet())?;

    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AppError::invalid_wallet())?;

    VerifyingKey::from_bytes(&array)
        .map_err(|_| AppError::invalid_wallet())
}

/// Verify an Ed25519 signature made by `wallet` over `message`.
///
/// # Returns
/// * `Ok(true)` if signature is valid
/// * `Ok(false)` if signature is invalid
/// * `Err(AppError)` if the wallet or signature is malformed
pub fn verify_signature(wallet: &str, message: &[u8], signature: &[u8]) -> Result<bool, AppError> {
    let verifying_key = wallet_public_key(wallet)?;

    let signature_array: [u8; 64] = signature.try_into().map_err(|_| {
        AppError::BadRequest(format!(
            "Invalid signature length: expected 64 bytes, got {}",
            signature.len()
        ))
    })?;
    let signature = Signature::from_bytes(&signature_array);

    Ok(verifying_key.verify(message, &signature).is_ok())
}
