//! Client error types.
//!
//! Every failure of the sign-in flow maps to one [`AuthError`] variant. The
//! controller catches them all at its boundary and reports them through
//! [`AuthEvents`](crate::client::AuthEvents); none propagate as `Err` to the UI.

/// Failures of the wallet sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Network or server error while obtaining a nonce.
    #[error("Failed to request sign-in nonce: {0}")]
    NonceRequestFailed(String),

    /// The wallet returned no signature.
    #[error("Signing was cancelled")]
    UserCancelledSigning,

    /// The server rejected the signed challenge.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The server no longer knows the nonce; the attempt must restart.
    #[error("Nonce expired or invalid, please sign in again")]
    NonceExpiredOrInvalid,

    /// `GET /api/auth/status` could not be completed.
    #[error("Auth status check failed: {0}")]
    StatusCheckFailed(String),

    /// `POST /api/auth/signout` could not be completed.
    #[error("Sign-out request failed: {0}")]
    SignOutFailed(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// Errors from a [`Storage`](crate::client::Storage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AuthError::VerificationFailed("Invalid signature".to_string()).to_string(),
            "Verification failed: Invalid signature"
        );
        assert_eq!(
            AuthError::UserCancelledSigning.to_string(),
            "Signing was cancelled"
        );
    }

    #[test]
    fn test_from_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: AuthError = StorageError::from(io).into();
        match err {
            AuthError::Storage(msg) => assert!(msg.contains("read-only")),
            other => panic!("Expected Storage variant, got {:?}", other),
        }
    }
}
