use super::{check_password_field, decode_form, redirect_with_session, valid_email, FieldErrors, Page};
use crate::{
    auth::{guard::HOME_PATH, CsrfToken, Principal, Session},
    charasheet::{error::AppError, state::AppState},
    storage::StorageError,
};
use axum::{
    extract::{rejection::FormRejection, Extension, Form},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
}

fn signup_page(
    csrf_token: &CsrfToken,
    principal: &Principal,
    email: &str,
    errors: &FieldErrors,
    status: StatusCode,
) -> Response {
    Page::new(Some(csrf_token), Some(principal))
        .with("form", json!({ "email": email }))
        .with_errors(errors)
        .render(status)
}

#[utoipa::path(
    get,
    path = "/signup",
    responses ((status = 200, description = "Empty signup form")),
    tag = "auth"
)]
pub async fn form(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    signup_page(
        &csrf_token,
        &principal,
        "",
        &FieldErrors::default(),
        StatusCode::OK,
    )
}

#[utoipa::path(
    post,
    path = "/signup",
    responses (
        (status = 303, description = "Account created and signed in, redirect to /"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Form errors")
    ),
    tag = "auth"
)]
pub async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Extension(mut session): Extension<Session>,
    form: Result<Form<SignupForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let existing = state.identities.get_by_email(&form.email).await?;

    let mut errors = FieldErrors::default();
    errors.check(!form.email.is_empty(), "email", "Email is required");
    errors.check(
        valid_email(&form.email),
        "email",
        "Must be a valid email address",
    );
    errors.check(existing.is_none(), "email", "Email is already in use");
    check_password_field(&mut errors, "password", &form.password, false);

    if !errors.is_empty() {
        return Ok(signup_page(
            &csrf_token,
            &principal,
            &form.email,
            &errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        ));
    }

    let hashed_password = state.credentials.hash(&form.password).await?;

    let user_id = match state.identities.insert(&form.email, &hashed_password).await {
        Ok(user_id) => user_id,
        Err(StorageError::Conflict) => {
            // lost a race with a concurrent signup for the same address
            errors.check(false, "email", "Email is already in use");
            return Ok(signup_page(
                &csrf_token,
                &principal,
                &form.email,
                &errors,
                StatusCode::UNPROCESSABLE_ENTITY,
            ));
        }
        Err(err) => return Err(err.into()),
    };

    info!(user_id, "User signed up");

    session.set_user_id(user_id);
    redirect_with_session(&state, &session, HOME_PATH)
}
