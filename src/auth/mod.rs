//! Server-side wallet authentication: nonces, Ed25519 verification and cookie sessions.

pub mod middleware;
pub mod session;
pub mod verify;

pub use middleware::{check_rate_limit, AppState, AuthSession};
pub use session::{generate_nonce, generate_session_token};
pub use verify::verify_signature;
