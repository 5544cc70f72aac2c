//! Random URL-safe tokens and their storage digests.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("failed to read random bytes from the operating system: {0}")]
pub struct TokenError(#[from] rand::Error);

/// Generate a 32-byte random token, base64url encoded without padding.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate() -> Result<String, TokenError> {
    Ok(Base64UrlUnpadded::encode_string(&random_bytes::<TOKEN_BYTES>()?))
}

/// Fill an array from the OS random source.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], TokenError> {
    let mut bytes = [0u8; N];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes)
}

/// SHA-256 digest of the token text. Only this value is persisted.
#[must_use]
pub fn hash(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}
