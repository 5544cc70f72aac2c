//! Authentication components: credentials, tokens, sessions, CSRF and identity resolution.

pub mod csrf;
pub mod guard;
pub mod legacy;
pub mod password;
pub mod reset;
pub mod resolver;
pub mod session;
pub mod token;

pub use csrf::{CsrfGuard, CsrfToken};
pub use guard::{GuardDecision, Policy};
pub use password::{CommonPasswordSet, CredentialManager, PasswordCost};
pub use reset::PasswordResetLedger;
pub use resolver::{Principal, Resolver};
pub use session::{Session, SessionStore};

use axum::http::{header::COOKIE, HeaderMap};

/// Value of the first cookie called `name` across all `Cookie` headers.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}
