//! Account activation tokens.
//!
//! A registration hands the plain token to the new user once. Only its
//! SHA-256 digest is stored, so a leaked store cannot activate accounts.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Generates a 256-bit random token, base64url-encoded (43 characters).
#[must_use]
pub fn generate_activation_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 digest of `token`, the form kept in storage.
#[must_use]
pub fn hash_activation_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
