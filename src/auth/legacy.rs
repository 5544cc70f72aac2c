//! Decoder for session blobs written by the legacy application.
//!
//! The stored value is `payload[:signature[:timestamp]]`. The payload is
//! base64url without padding, prefixed with `.` when the JSON inside was
//! zlib-compressed. Signatures are not verified here: the row was fetched by
//! its secret session key, which is what authenticates it.

use base64ct::{Base64UrlUnpadded, Encoding};
use flate2::read::ZlibDecoder;
use serde::Deserialize;
use std::io::Read;

/// Upper bound on the inflated payload.
pub const MAX_DECOMPRESSED_BYTES: u64 = 64 * 1024;

const COMPRESSED_SIGIL: char = '.';

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LegacySessionClaim {
    #[serde(rename = "_auth_user_id", default)]
    pub auth_user_id: String,
    #[serde(rename = "_auth_user_backend", default)]
    pub auth_user_backend: String,
    #[serde(rename = "_auth_user_hash", default)]
    pub auth_user_hash: String,
    #[serde(default)]
    pub preview: bool,
}

impl LegacySessionClaim {
    /// The claimed user id, when it is a positive integer.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.auth_user_id.parse::<i64>().ok().filter(|id| *id > 0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LegacyDecodeError {
    #[error("legacy session payload is empty")]
    Empty,
    #[error("legacy session payload is not valid base64url")]
    Base64,
    #[error("legacy session payload could not be inflated: {0}")]
    Decompress(#[source] std::io::Error),
    #[error("legacy session payload exceeds {MAX_DECOMPRESSED_BYTES} bytes once inflated")]
    TooLarge,
    #[error("legacy session payload is not a JSON object: {0}")]
    Json(#[source] serde_json::Error),
}

/// Decode a legacy `session_data` value into its claim.
///
/// # Errors
/// Returns a `LegacyDecodeError` naming the step that failed.
pub fn decode(session_data: &str) -> Result<LegacySessionClaim, LegacyDecodeError> {
    let payload = session_data.split(':').next().unwrap_or_default();

    let (payload, compressed) = match payload.strip_prefix(COMPRESSED_SIGIL) {
        Some(rest) => (rest, true),
        None => (payload, false),
    };

    if payload.is_empty() {
        return Err(LegacyDecodeError::Empty);
    }

    let raw = Base64UrlUnpadded::decode_vec(payload).map_err(|_| LegacyDecodeError::Base64)?;

    let json = if compressed { inflate(&raw)? } else { raw };

    let value: serde_json::Value = serde_json::from_slice(&json).map_err(LegacyDecodeError::Json)?;
    if !value.is_object() {
        return Err(LegacyDecodeError::Json(serde::de::Error::custom(
            "expected a JSON object",
        )));
    }

    serde_json::from_value(value).map_err(LegacyDecodeError::Json)
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, LegacyDecodeError> {
    let mut out = Vec::new();
    ZlibDecoder::new(compressed)
        .take(MAX_DECOMPRESSED_BYTES + 1)
        .read_to_end(&mut out)
        .map_err(LegacyDecodeError::Decompress)?;

    if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(LegacyDecodeError::TooLarge);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    const PLAIN: &str = "eyJfYXV0aF91c2VyX2lkIjoiNDIifQ";
    const COMPRESSED: &str = ".eJyrVopPLC3JiC8tTi2Kz0xRslIyMVKqBQBdkQd8";
    const FULL_PLAIN: &str = "eyJfYXV0aF91c2VyX2lkIjoiNyIsIl9hdXRoX3VzZXJfYmFja2VuZCI6ImRqYW5nby5jb250cmliLmF1dGguYmFja2VuZHMuTW9kZWxCYWNrZW5kIiwiX2F1dGhfdXNlcl9oYXNoIjoiYWJjMTIzIiwicHJldmlldyI6dHJ1ZX0";
    const FULL_COMPRESSED: &str = ".eJyrVopPLC3JiC8tTi2Kz0xRslIyV9JBFktKTM5OzQNJpGQl5qXn6yXn55UUZSbpgZToQWWL9XzzU1JznKBqUQzISCzOAOpOTEo2NDIGShUUpZZlppYrWZUUlabWAgCHjC17";

    #[test]
    fn plain_payload_decodes() -> anyhow::Result<()> {
        let claim = decode(PLAIN)?;
        assert_eq!(claim.auth_user_id, "42");
        assert_eq!(claim.user_id(), Some(42));
        assert!(!claim.preview);
        Ok(())
    }

    #[test]
    fn compressed_payload_decodes() -> anyhow::Result<()> {
        assert_eq!(decode(COMPRESSED)?.user_id(), Some(42));
        Ok(())
    }

    #[test]
    fn signature_and_timestamp_are_ignored() -> anyhow::Result<()> {
        let signed = format!("{COMPRESSED}:1qWz7b:Xb3n4kFh2QmB1vK9aE0zYtUeR5s");
        assert_eq!(decode(&signed)?.user_id(), Some(42));
        let signed = format!("{PLAIN}:sig");
        assert_eq!(decode(&signed)?.user_id(), Some(42));
        Ok(())
    }

    #[test]
    fn every_field_is_read() -> anyhow::Result<()> {
        let expected = LegacySessionClaim {
            auth_user_id: "7".to_string(),
            auth_user_backend: "django.contrib.auth.backends.ModelBackend".to_string(),
            auth_user_hash: "abc123".to_string(),
            preview: true,
        };
        assert_eq!(decode(FULL_PLAIN)?, expected);
        assert_eq!(decode(FULL_COMPRESSED)?, expected);
        Ok(())
    }

    #[test]
    fn non_numeric_or_non_positive_ids_are_rejected() -> anyhow::Result<()> {
        // {"_auth_user_id":"abc"}
        assert_eq!(decode("eyJfYXV0aF91c2VyX2lkIjoiYWJjIn0")?.user_id(), None);
        // {"_auth_user_id":"-3"}
        assert_eq!(decode("eyJfYXV0aF91c2VyX2lkIjoiLTMifQ")?.user_id(), None);
        assert_eq!(LegacySessionClaim::default().user_id(), None);
        Ok(())
    }

    #[test]
    fn empty_payloads_fail() {
        assert!(matches!(decode(""), Err(LegacyDecodeError::Empty)));
        assert!(matches!(decode("."), Err(LegacyDecodeError::Empty)));
        assert!(matches!(decode(":sig"), Err(LegacyDecodeError::Empty)));
    }

    #[test]
    fn garbage_fails_without_panicking() {
        assert!(matches!(decode("!!!"), Err(LegacyDecodeError::Base64)));
        // "not json"
        assert!(matches!(decode("bm90IGpzb24"), Err(LegacyDecodeError::Json(_))));
        // base64 of "not zlib" behind the compression sigil
        assert!(matches!(
            decode(".bm90IHpsaWI"),
            Err(LegacyDecodeError::Decompress(_))
        ));
    }

    #[test]
    fn json_arrays_are_not_claims() {
        // "[]"
        assert!(matches!(decode("W10"), Err(LegacyDecodeError::Json(_))));
    }

    #[test]
    fn oversized_inflation_is_rejected() -> anyhow::Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        let padding = " ".repeat(usize::try_from(MAX_DECOMPRESSED_BYTES)? + 10);
        encoder.write_all(format!("{{\"_auth_user_id\":\"1\"{padding}}}").as_bytes())?;
        let payload = format!(".{}", Base64UrlUnpadded::encode_string(&encoder.finish()?));
        assert!(matches!(decode(&payload), Err(LegacyDecodeError::TooLarge)));
        Ok(())
    }
}
