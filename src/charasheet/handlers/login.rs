use super::{decode_form, redirect_with_session, FieldErrors, Page};
use crate::{
    auth::{guard::HOME_PATH, CsrfToken, Principal, Session},
    charasheet::{error::AppError, state::AppState},
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
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

fn login_page(
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
    path = "/login",
    responses ((status = 200, description = "Empty login form")),
    tag = "auth"
)]
pub async fn form(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    login_page(
        &csrf_token,
        &principal,
        "",
        &FieldErrors::default(),
        StatusCode::OK,
    )
}

#[utoipa::path(
    post,
    path = "/login",
    responses (
        (status = 303, description = "Signed in, redirect to the saved path or /"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Unknown email or wrong password")
    ),
    tag = "auth"
)]
pub async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Extension(mut session): Extension<Session>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let user = state.identities.get_by_email(&form.email).await?;

    let mut errors = FieldErrors::default();
    errors.check(!form.email.is_empty(), "email", "Email is required");
    errors.check(user.is_some(), "email", "Email address could not be found");

    if let Some(user) = &user {
        errors.check(!form.password.is_empty(), "password", "Password is required");
        if !form.password.is_empty() {
            let matches = state
                .credentials
                .matches(&form.password, &user.hashed_password)
                .await?;
            errors.check(matches, "password", "Password is incorrect");
        }
    }

    let Some(user) = user.filter(|_| errors.is_empty()) else {
        return Ok(login_page(
            &csrf_token,
            &principal,
            &form.email,
            &errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        ));
    };

    info!(user_id = user.id, "User logged in");

    session.set_user_id(user.id);
    let redirect_path = session
        .take_redirect_path_after_login()
        .unwrap_or_else(|| HOME_PATH.to_string());

    redirect_with_session(&state, &session, &redirect_path)
}
