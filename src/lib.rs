//! # Charasheet (authentication & session resolution)
//!
//! `charasheet` is the server-side authentication core of the character sheet
//! web application. It owns password credentials, password-reset links, the
//! first-party encrypted cookie session and the read-only bridge to the legacy
//! session table inherited from the previous application.
//!
//! ## Request pipeline
//!
//! Every request crosses a fixed sequence of stages before reaching a handler:
//!
//! 1. **Panic containment:** a panicking handler becomes a generic `500`.
//! 2. **Security headers:** `Referrer-Policy`, `X-Content-Type-Options`, `X-Frame-Options`.
//! 3. **CSRF guard:** state-changing requests must carry the anti-forgery token.
//! 4. **Authentication:** the first-party session wins, then the legacy `sessionid`
//!    cookie, otherwise the request is anonymous.
//! 5. **Route guard:** anonymous-only or authenticated-only routes redirect with `303`.
//!
//! ## Sessions
//!
//! The `session` cookie is AES-256-GCM encrypted with a key derived from the
//! configured secret. Old secrets stay accepted for decryption so secret
//! rotation never logs anyone out.
//!
//! ## Password resets
//!
//! Reset links embed a random token; only its SHA-256 digest is stored. Completing
//! a reset deletes every outstanding link of the same user.

pub mod auth;
pub mod charasheet;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
