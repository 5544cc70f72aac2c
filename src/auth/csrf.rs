//! Double-submit anti-forgery tokens.
//!
//! The raw 32-byte token lives in the `csrf_token` cookie. Pages receive a
//! masked copy, `base64url(otp || otp ^ token)`, which differs on every request.
//! A state-changing request must echo either form back in the `csrf_token`
//! form field or the `X-CSRF-Token` header.

use super::{cookie_value, token};
use axum::http::{HeaderMap, HeaderValue, Method};
use base64ct::{Base64UrlUnpadded, Encoding};
use subtle::ConstantTimeEq;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_FORM_FIELD: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_MAX_AGE_SECONDS: i64 = 86_400;

const TOKEN_LEN: usize = 32;

type RawToken = [u8; TOKEN_LEN];

/// Masked token handed to handlers for embedding in forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsrfGuard {
    secure: bool,
}

impl CsrfGuard {
    #[must_use]
    pub const fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// Methods that never need a submitted token.
    #[must_use]
    pub fn is_safe_method(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }

    /// The well-formed token stored in the request's cookie.
    #[must_use]
    pub fn cookie_token(&self, headers: &HeaderMap) -> Option<RawToken> {
        let value = cookie_value(headers, CSRF_COOKIE_NAME)?;
        Base64UrlUnpadded::decode_vec(&value)
            .ok()
            .and_then(|bytes| RawToken::try_from(bytes).ok())
    }

    /// Reuse the cookie token or mint a new one.
    ///
    /// # Errors
    /// Returns an error if a new token is needed and randomness is unavailable.
    pub fn current_or_new(&self, headers: &HeaderMap) -> Result<RawToken, token::TokenError> {
        match self.cookie_token(headers) {
            Some(token) => Ok(token),
            None => token::random_bytes::<TOKEN_LEN>(),
        }
    }

    /// `Set-Cookie` value carrying `token`.
    #[must_use]
    pub fn cookie(&self, token: &RawToken) -> HeaderValue {
        let secure = if self.secure { "; Secure" } else { "" };
        let value = Base64UrlUnpadded::encode_string(token);
        let cookie = format!(
            "{CSRF_COOKIE_NAME}={value}; Path=/; Max-Age={CSRF_MAX_AGE_SECONDS}; HttpOnly; SameSite=Lax{secure}"
        );
        // base64url and fixed attributes are always valid header text
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// One-time-pad mask of `token` for embedding in a page.
    ///
    /// # Errors
    /// Returns an error if randomness is unavailable.
    pub fn mask(token: &RawToken) -> Result<CsrfToken, token::TokenError> {
        let otp = token::random_bytes::<TOKEN_LEN>()?;
        let mut masked = Vec::with_capacity(TOKEN_LEN * 2);
        masked.extend_from_slice(&otp);
        masked.extend(otp.iter().zip(token.iter()).map(|(pad, byte)| pad ^ byte));
        Ok(CsrfToken(Base64UrlUnpadded::encode_string(&masked)))
    }

    /// Constant-time check of a submitted token, masked or raw, against the cookie token.
    #[must_use]
    pub fn verify(expected: &RawToken, submitted: &str) -> bool {
        let Ok(bytes) = Base64UrlUnpadded::decode_vec(submitted.trim()) else {
            return false;
        };

        let candidate: RawToken = match bytes.len() {
            len if len == TOKEN_LEN * 2 => {
                let (otp, masked) = bytes.split_at(TOKEN_LEN);
                let mut unmasked = [0u8; TOKEN_LEN];
                for (slot, (pad, byte)) in unmasked.iter_mut().zip(otp.iter().zip(masked)) {
                    *slot = pad ^ byte;
                }
                unmasked
            }
            len if len == TOKEN_LEN => match RawToken::try_from(bytes) {
                Ok(raw) => raw,
                Err(_) => return false,
            },
            _ => return false,
        };

        candidate.as_slice().ct_eq(expected.as_slice()).into()
    }

    /// Token submitted in the `X-CSRF-Token` header, if any.
    #[must_use]
    pub fn header_token(headers: &HeaderMap) -> Option<String> {
        headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Token submitted in an urlencoded form body, if any.
    #[must_use]
    pub fn form_token(body: &[u8]) -> Option<String> {
        url::form_urlencoded::parse(body)
            .find(|(key, _)| key == CSRF_FORM_FIELD)
            .map(|(_, value)| value.into_owned())
    }
}
