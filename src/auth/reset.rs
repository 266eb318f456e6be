//! Single-use password-reset tokens.
//!
//! The plaintext token leaves the process exactly once, inside the reset
//! email; only its SHA-256 digest is persisted on the user row.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

const TOKEN_BYTES: usize = 32;

#[derive(Debug)]
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

/// Creates a fresh high-entropy token. No storage side effect: the caller
/// persists `hash` and `expires_at` and sends `plaintext` out-of-band.
pub fn generate(ttl: Duration) -> ResetToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    ResetToken {
        hash: hash_token(&plaintext),
        plaintext,
        expires_at: OffsetDateTime::now_utc() + ttl,
    }
}

/// Digest of a presented token, safe to store and to use in lookups.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn matches(candidate: &str, stored_hash: &str) -> bool {
    hash_token(candidate) == stored_hash
}
