//! Token and nonce generation, and the session cookie.

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "predikt_session";

/// Generate a cryptographically random session token.
///
/// URL-safe base64 without padding (43 characters) so it can live in a cookie
/// value unquoted.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically random sign-in nonce.
///
/// Returns a base64-encoded string (44 characters) from 32 random bytes.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

/// `Set-Cookie` value establishing a session.
pub fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value expiring the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// Extract the session token from a `Cookie` request header value.
pub fn session_token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
