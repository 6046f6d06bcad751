//! Bearer-token authentication for the conversion endpoint

use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Shared secret used when neither `API_KEY` nor `--api-key` is provided
pub const DEFAULT_API_KEY: &str = "imageflow-dev-key";

/// The configured API key, stored as a SHA-256 digest
///
/// Keeping only the digest means the secret never sits in memory longer than
/// construction, and verification compares fixed-length digests instead of
/// variable-length strings.
#[derive(Debug, Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self {
            digest: digest.into(),
        }
    }

    /// Short hex fingerprint of the key, safe to log at startup
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Constant-time comparison of a presented token against the secret
    ///
    /// Both sides are hashed and the digests folded without short-circuiting,
    /// so the comparison time does not depend on where the mismatch occurs.
    pub fn verify(&self, presented: &str) -> bool {
        let other: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        self.digest
            .iter()
            .zip(other.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Check an `Authorization` header value against the secret
    ///
    /// Accepts `Bearer <token>` with a case-insensitive scheme, as auth
    /// schemes are per RFC 7235; a missing header, a different scheme, or a
    /// mismatched token all fail the same way.
    pub fn check_bearer(&self, header: Option<&str>) -> Result<()> {
        let raw = header.ok_or(Error::Unauthorized)?;
        let (scheme, token) = raw.split_once(' ').ok_or(Error::Unauthorized)?;
        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(Error::Unauthorized);
        }
        if self.verify(token.trim()) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}
