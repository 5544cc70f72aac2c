//! Request middleware for each pipeline stage.

use super::{error::AppError, state::AppState};
use crate::auth::{
    guard::{GuardDecision, HOME_PATH, LOGIN_PATH},
    resolver::Credentials,
    CsrfGuard, Policy, Principal, Session,
};
use axum::{
    body::{to_bytes, Body},
    extract::{Extension, Request},
    http::{
        header::{
            CACHE_CONTROL, CONTENT_TYPE, LOCATION, REFERRER_POLICY, SET_COOKIE,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::{any::Any, sync::Arc};
use tracing::{error, warn};

/// Largest form body buffered while looking for the CSRF field.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

fn is_urlencoded_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

/// Reject state-changing requests without a matching token, and hand a masked
/// token to the handler.
pub async fn csrf(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let guard = state.csrf;
    let cookie_token = guard.cookie_token(request.headers());

    let mut request = if CsrfGuard::is_safe_method(request.method()) {
        request
    } else {
        let (parts, body) = request.into_parts();

        let mut submitted = CsrfGuard::header_token(&parts.headers);
        let body = if submitted.is_none() && is_urlencoded_form(&parts.headers) {
            let Ok(bytes) = to_bytes(body, MAX_FORM_BYTES).await else {
                return AppError::BadRequest("unreadable form body".to_string()).into_response();
            };
            submitted = CsrfGuard::form_token(&bytes);
            Body::from(bytes)
        } else {
            body
        };

        let verified = match (&cookie_token, &submitted) {
            (Some(expected), Some(submitted)) => CsrfGuard::verify(expected, submitted),
            _ => false,
        };
        if !verified {
            warn!(
                method = %parts.method,
                has_cookie = cookie_token.is_some(),
                has_token = submitted.is_some(),
                "CSRF check failed"
            );
            return forbidden();
        }

        Request::from_parts(parts, body)
    };

    let token = match cookie_token {
        Some(token) => token,
        None => match guard.current_or_new(request.headers()) {
            Ok(token) => token,
            Err(err) => return AppError::from(err).into_response(),
        },
    };
    let masked = match CsrfGuard::mask(&token) {
        Ok(masked) => masked,
        Err(err) => return AppError::from(err).into_response(),
    };
    request.extensions_mut().insert(masked);

    let mut response = next.run(request).await;
    response.headers_mut().append(SET_COOKIE, guard.cookie(&token));
    response
}

/// Resolve the principal and expose it, with the session, to later stages.
pub async fn authenticate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = state.sessions.load(request.headers());

    let principal = match state
        .resolver
        .resolve(Credentials {
            headers: request.headers(),
            session: &session,
        })
        .await
    {
        Ok(principal) => principal,
        Err(err) => return AppError::from(err).into_response(),
    };

    request.extensions_mut().insert(session);
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Apply `policy` to the principal resolved by `authenticate`.
pub async fn enforce(
    policy: Policy,
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_default();

    match policy.evaluate(&principal) {
        GuardDecision::Proceed => next.run(request).await,
        GuardDecision::ProceedPrivate => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        GuardDecision::RedirectToLogin => {
            let mut session = request
                .extensions()
                .get::<Session>()
                .cloned()
                .unwrap_or_default();
            session.set_redirect_path_after_login(request.uri().path());

            match state.sessions.save(&session) {
                Ok(cookie) => see_other(LOGIN_PATH, Some(cookie)),
                Err(err) => AppError::from(err).into_response(),
            }
        }
        GuardDecision::RedirectHome => Redirect::to(HOME_PATH).into_response(),
    }
}

/// `303 See Other` to `location`, optionally setting a cookie.
pub(crate) fn see_other(location: &str, cookie: Option<HeaderValue>) -> Response {
    let mut response = StatusCode::SEE_OTHER.into_response();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(_) => {
            response
                .headers_mut()
                .insert(LOCATION, HeaderValue::from_static(HOME_PATH));
        }
    }
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Turn a handler panic into a generic `500`.
///
/// Runs outside the security-header stage, so the headers are set here too.
#[allow(clippy::needless_pass_by_value)]
pub fn contain_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!("Handler panicked: {detail}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [
            (REFERRER_POLICY, HeaderValue::from_static("origin-when-cross-origin")),
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_FRAME_OPTIONS, HeaderValue::from_static("deny")),
        ],
        "Internal Server Error",
    )
        .into_response()
}
