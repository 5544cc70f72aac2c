//! Route handlers.
//!
//! Page rendering is delegated to the front end: handlers answer with the JSON
//! state a template would receive (form values, field errors, the CSRF token
//! and the signed-in user). Validation failures use `422`, successful form
//! posts redirect with `303`.

pub mod character;
pub mod home;
pub mod login;
pub mod logout;
pub mod password;
pub mod signup;
pub mod version;

use super::{error::AppError, middleware::see_other, state::AppState};
use crate::auth::{password::PasswordIssue, CsrfToken, Principal, Session};
use axum::{
    extract::{rejection::FormRejection, Form},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, sync::OnceLock};

/// Lightweight email sanity check used before touching storage.
pub fn valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

/// First error recorded for each form field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    /// Record `message` for `field` unless `ok`, keeping any earlier message.
    pub fn check(&mut self, ok: bool, field: &'static str, message: &'static str) {
        if !ok {
            self.0.entry(field).or_insert(message);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(field, message)| ((*field).to_string(), json!(message)))
                .collect(),
        )
    }
}

/// Password rule messages, prefixed for the reset form ("New password ...").
pub(crate) fn check_password_field(
    errors: &mut FieldErrors,
    field: &'static str,
    password: &str,
    new_password: bool,
) {
    let Some(issue) = crate::auth::password::check_password(password) else {
        return;
    };
    let message = match (issue, new_password) {
        (PasswordIssue::Missing, false) => "Password is required",
        (PasswordIssue::TooShort, false) => "Password is too short",
        (PasswordIssue::TooLong, false) => "Password is too long",
        (PasswordIssue::TooCommon, false) => "Password is too common",
        (PasswordIssue::Missing, true) => "New password is required",
        (PasswordIssue::TooShort, true) => "New password is too short",
        (PasswordIssue::TooLong, true) => "New password is too long",
        (PasswordIssue::TooCommon, true) => "New password is too common",
    };
    errors.check(false, field, message);
}

/// Template state shared by every page.
pub(crate) struct Page<'a> {
    csrf_token: Option<&'a CsrfToken>,
    principal: Option<&'a Principal>,
    data: Map<String, Value>,
}

impl<'a> Page<'a> {
    pub(crate) fn new(csrf_token: Option<&'a CsrfToken>, principal: Option<&'a Principal>) -> Self {
        Self {
            csrf_token,
            principal,
            data: Map::new(),
        }
    }

    #[must_use]
    pub(crate) fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub(crate) fn with_errors(self, errors: &FieldErrors) -> Self {
        self.with("errors", errors.to_json())
    }

    fn into_value(self) -> Value {
        let mut page = Map::new();
        page.insert(
            "csrf_token".to_string(),
            json!(self.csrf_token.map(CsrfToken::as_str)),
        );
        page.insert(
            "authenticated_user".to_string(),
            json!(self.principal.and_then(Principal::identity)),
        );
        page.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        page.extend(self.data);
        Value::Object(page)
    }

    pub(crate) fn render(self, status: StatusCode) -> Response {
        (status, Json(self.into_value())).into_response()
    }
}

/// Unwrap a form extraction, mapping malformed bodies to `400`.
pub(crate) fn decode_form<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(form)| form)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Persist `session` and `303` to `location`.
pub(crate) fn redirect_with_session(
    state: &AppState,
    session: &Session,
    location: &str,
) -> Result<Response, AppError> {
    let cookie = state.sessions.save(session)?;
    Ok(see_other(location, Some(cookie)))
}
