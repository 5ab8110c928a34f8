//! Human-readable challenge text signed by the wallet.
//!
//! Format:
//! ```text
//! Sign in to Predikt
//!
//! Wallet: {wallet}
//! Nonce: {nonce}
//! ```

use crate::models::WalletAddress;

/// First line of every challenge; also the static message of the legacy guard.
pub const CHALLENGE_HEADER: &str = "Sign in to Predikt";

const WALLET_PREFIX: &str = "Wallet: ";
const NONCE_PREFIX: &str = "Nonce: ";

/// Build the challenge text embedding `nonce` for `wallet`.
pub fn build_challenge(wallet: &WalletAddress, nonce: &str) -> String {
    format!(
        "{}\n\n{}{}\n{}{}",
        CHALLENGE_HEADER, WALLET_PREFIX, wallet, NONCE_PREFIX, nonce
    )
}

/// Wallet and nonce extracted from a challenge text.
#[derive(Debug, PartialEq, Eq)]
pub struct ParsedChallenge<'a> {
    pub wallet: &'a str,
    pub nonce: &'a str,
}

/// Parse a challenge produced by [`build_challenge`].
///
/// Returns `None` if the header is missing or either field is absent.
pub fn parse_challenge(message: &str) -> Option<ParsedChallenge<'_>> {
    let mut lines = message.lines();
    if lines.next()? != CHALLENGE_HEADER {
        return None;
    }

    let mut wallet = None;
    let mut nonce = None;
    for line in lines {
        if let Some(w) = line.strip_prefix(WALLET_PREFIX) {
            wallet = Some(w);
        } else if let Some(n) = line.strip_prefix(NONCE_PREFIX) {
            nonce = Some(n);
        }
    }

    Some(ParsedChallenge {
        wallet: wallet?,
        nonce: nonce?,
    })
}
