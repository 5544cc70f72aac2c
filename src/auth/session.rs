//! First-party cookie session.
//!
//! The session travels in the `session` cookie as
//! `base64url(nonce || AES-256-GCM(json))`, authenticated with the cookie name
//! as associated data. Each configured secret yields one key (SHA-256 of the
//! secret); the first key encrypts, every key is tried on decryption.

use super::{cookie_value, token};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use axum::http::{HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub const SESSION_COOKIE_NAME: &str = "session";
pub const SESSION_MAX_AGE_SECONDS: i64 = 7 * 24 * 60 * 60;

const NONCE_BYTES: usize = 12;
const MAX_COOKIE_BYTES: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("at least one session secret is required")]
    NoKeys,
    #[error("session secrets must not be empty")]
    EmptySecret,
    #[error("session cookie is not valid base64url")]
    Encoding,
    #[error("session cookie could not be authenticated with any key")]
    Unauthenticated,
    #[error("session cookie expired")]
    Expired,
    #[error("session payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("session encryption failed")]
    Encrypt,
    #[error("session cookie would exceed {MAX_COOKIE_BYTES} bytes")]
    TooLarge,
    #[error(transparent)]
    Random(#[from] token::TokenError),
}

/// Values carried by the session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_path_after_login: Option<String>,
}

impl Session {
    #[must_use]
    pub const fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn set_user_id(&mut self, user_id: i64) {
        self.user_id = Some(user_id);
    }

    /// Log out.
    pub fn clear_user_id(&mut self) {
        self.user_id = None;
    }

    #[must_use]
    pub fn redirect_path_after_login(&self) -> Option<&str> {
        self.redirect_path_after_login.as_deref()
    }

    pub fn set_redirect_path_after_login(&mut self, path: impl Into<String>) {
        self.redirect_path_after_login = Some(path.into());
    }

    /// Read and clear the post-login redirect in one step.
    pub fn take_redirect_path_after_login(&mut self) -> Option<String> {
        self.redirect_path_after_login.take()
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    issued_at: i64,
    values: Session,
}

/// Encrypts, decrypts and serializes sessions.
#[derive(Clone)]
pub struct SessionStore {
    ciphers: Vec<Aes256Gcm>,
    secure: bool,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.ciphers.len())
            .field("secure", &self.secure)
            .finish()
    }
}

impl SessionStore {
    /// Build a store from the current secret followed by retired ones.
    ///
    /// # Errors
    /// Returns an error when no secret is given or one of them is empty.
    pub fn new(secrets: &[SecretString], secure: bool) -> Result<Self, SessionError> {
        if secrets.is_empty() {
            return Err(SessionError::NoKeys);
        }

        let ciphers = secrets
            .iter()
            .map(|secret| {
                let secret = secret.expose_secret();
                if secret.is_empty() {
                    return Err(SessionError::EmptySecret);
                }
                Ok(Aes256Gcm::new(&Sha256::digest(secret.as_bytes())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { ciphers, secure })
    }

    /// Session carried by the request, or a fresh one.
    ///
    /// A cookie that fails authentication, has expired or is malformed is
    /// treated as absent.
    #[must_use]
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let Some(value) = cookie_value(headers, SESSION_COOKIE_NAME) else {
            return Session::default();
        };

        match self.decode(&value) {
            Ok(session) => session,
            Err(SessionError::Expired) => {
                debug!("Session cookie expired, starting a new session");
                Session::default()
            }
            Err(err) => {
                warn!("Discarding session cookie: {err}");
                Session::default()
            }
        }
    }

    /// Encrypt `session` and render its `Set-Cookie` header.
    ///
    /// # Errors
    /// Returns an error if encryption fails or the cookie would be too large.
    pub fn save(&self, session: &Session) -> Result<HeaderValue, SessionError> {
        let value = self.encode(session)?;
        let secure = if self.secure { "; Secure" } else { "" };
        let cookie = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; Max-Age={SESSION_MAX_AGE_SECONDS}; HttpOnly; SameSite=Lax{secure}"
        );
        if cookie.len() > MAX_COOKIE_BYTES {
            return Err(SessionError::TooLarge);
        }
        HeaderValue::from_str(&cookie).map_err(|_| SessionError::Encoding)
    }

    /// Cookie value for `session`, encrypted with the current key.
    ///
    /// # Errors
    /// Returns an error if randomness or encryption fails.
    pub fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let envelope = Envelope {
            issued_at: Utc::now().timestamp(),
            values: session.clone(),
        };
        let plaintext = serde_json::to_vec(&envelope)?;

        let nonce = token::random_bytes::<NONCE_BYTES>()?;

        let cipher = self.ciphers.first().ok_or(SessionError::NoKeys)?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: SESSION_COOKIE_NAME.as_bytes(),
                },
            )
            .map_err(|_| SessionError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(Base64UrlUnpadded::encode_string(&sealed))
    }

    /// Authenticate and decrypt a cookie value with each key in turn.
    ///
    /// # Errors
    /// Returns an error if no key authenticates the value, the payload is
    /// malformed or the session expired.
    pub fn decode(&self, value: &str) -> Result<Session, SessionError> {
        let sealed = Base64UrlUnpadded::decode_vec(value).map_err(|_| SessionError::Encoding)?;
        if sealed.len() <= NONCE_BYTES {
            return Err(SessionError::Unauthenticated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);

        let plaintext = self
            .ciphers
            .iter()
            .find_map(|cipher| {
                cipher
                    .decrypt(
                        Nonce::from_slice(nonce),
                        Payload {
                            msg: ciphertext,
                            aad: SESSION_COOKIE_NAME.as_bytes(),
                        },
                    )
                    .ok()
            })
            .ok_or(SessionError::Unauthenticated)?;

        let envelope: Envelope = serde_json::from_slice(&plaintext)?;
        if Utc::now().timestamp() - envelope.issued_at > SESSION_MAX_AGE_SECONDS {
            return Err(SessionError::Expired);
        }

        Ok(envelope.values)
    }

    #[cfg(test)]
    fn encode_issued_at(&self, session: &Session, issued_at: i64) -> String {
        let plaintext = serde_json::to_vec(&Envelope {
            issued_at,
            values: session.clone(),
        })
        .expect("serializable");
        let nonce = [7u8; NONCE_BYTES];
        let mut sealed = nonce.to_vec();
        sealed.extend(
            self.ciphers[0]
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &plaintext,
                        aad: SESSION_COOKIE_NAME.as_bytes(),
                    },
                )
                .expect("encrypts"),
        );
        Base64UrlUnpadded::encode_string(&sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn store(secrets: &[&str]) -> SessionStore {
        let secrets: Vec<SecretString> = secrets.iter().map(|s| secret(s)).collect();
        SessionStore::new(&secrets, true).expect("valid secrets")
    }

    fn headers_with(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).expect("ascii cookie"));
        headers
    }

    #[test]
    fn round_trip_keeps_values() -> Result<(), SessionError> {
        let store = store(&["current-secret"]);
        let mut session = Session::default();
        session.set_user_id(42);
        session.set_redirect_path_after_login("/character/5/notes_change/");

        let decoded = store.decode(&store.encode(&session)?)?;
        assert_eq!(decoded, session);
        Ok(())
    }

    #[test]
    fn rotated_key_still_decrypts() -> Result<(), SessionError> {
        let old = store(&["old-secret"]);
        let rotated = store(&["new-secret", "old-secret"]);
        let mut session = Session::default();
        session.set_user_id(9);

        let cookie = old.encode(&session)?;
        assert_eq!(rotated.decode(&cookie)?.user_id(), Some(9));

        // new cookies are sealed with the first key only
        let fresh = rotated.encode(&session)?;
        assert!(matches!(
            old.decode(&fresh),
            Err(SessionError::Unauthenticated)
        ));
        Ok(())
    }

    #[test]
    fn unknown_key_is_rejected() -> Result<(), SessionError> {
        let cookie = store(&["one"]).encode(&Session::default())?;
        assert!(matches!(
            store(&["two"]).decode(&cookie),
            Err(SessionError::Unauthenticated)
        ));
        Ok(())
    }

    #[test]
    fn tampered_cookie_is_rejected() -> Result<(), SessionError> {
        let store = store(&["secret"]);
        let mut session = Session::default();
        session.set_user_id(1);
        let cookie = store.encode(&session)?;

        let mut bytes = Base64UrlUnpadded::decode_vec(&cookie).map_err(|_| SessionError::Encoding)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = Base64UrlUnpadded::encode_string(&bytes);

        assert!(matches!(
            store.decode(&tampered),
            Err(SessionError::Unauthenticated)
        ));
        Ok(())
    }

    #[test]
    fn expired_cookie_loads_as_fresh_session() {
        let store = store(&["secret"]);
        let mut session = Session::default();
        session.set_user_id(3);
        let issued_at = Utc::now().timestamp() - SESSION_MAX_AGE_SECONDS - 60;
        let cookie = store.encode_issued_at(&session, issued_at);

        assert!(matches!(store.decode(&cookie), Err(SessionError::Expired)));
        let loaded = store.load(&headers_with(&format!("{SESSION_COOKIE_NAME}={cookie}")));
        assert_eq!(loaded, Session::default());
    }

    #[test]
    fn garbage_cookie_loads_as_fresh_session() {
        let store = store(&["secret"]);
        let loaded = store.load(&headers_with("session=%%%; other=1"));
        assert_eq!(loaded.user_id(), None);
        let loaded = store.load(&headers_with("session=AAAA"));
        assert_eq!(loaded.user_id(), None);
    }

    #[test]
    fn load_finds_cookie_among_others() -> Result<(), SessionError> {
        let store = store(&["secret"]);
        let mut session = Session::default();
        session.set_user_id(11);
        let cookie = store.encode(&session)?;
        let loaded = store.load(&headers_with(&format!(
            "csrf_token=abc; {SESSION_COOKIE_NAME}={cookie}; theme=dark"
        )));
        assert_eq!(loaded.user_id(), Some(11));
        Ok(())
    }

    #[test]
    fn take_redirect_path_clears_it() {
        let mut session = Session::default();
        session.set_redirect_path_after_login("/somewhere");
        assert_eq!(
            session.take_redirect_path_after_login().as_deref(),
            Some("/somewhere")
        );
        assert_eq!(session.take_redirect_path_after_login(), None);
    }

    #[test]
    fn save_sets_cookie_attributes() -> Result<(), SessionError> {
        let header = store(&["secret"]).save(&Session::default())?;
        let header = header.to_str().unwrap_or_default();
        assert!(header.starts_with("session="));
        assert!(header.contains("Path=/"));
        assert!(header.contains("Max-Age=604800"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Secure"));

        let secrets = [secret("secret")];
        let insecure = SessionStore::new(&secrets, false)?.save(&Session::default())?;
        assert!(!insecure.to_str().unwrap_or_default().contains("Secure"));
        Ok(())
    }

    #[test]
    fn oversized_session_is_refused() {
        let mut session = Session::default();
        session.set_redirect_path_after_login("/".repeat(5000));
        assert!(matches!(
            store(&["secret"]).save(&session),
            Err(SessionError::TooLarge)
        ));
    }

    #[test]
    fn secrets_are_required() {
        assert!(matches!(
            SessionStore::new(&[], true),
            Err(SessionError::NoKeys)
        ));
        assert!(matches!(
            SessionStore::new(&[secret("")], true),
            Err(SessionError::EmptySecret)
        ));
    }
}
