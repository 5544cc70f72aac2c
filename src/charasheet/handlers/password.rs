//! Forgotten-password and password-reset flows.

use super::{check_password_field, decode_form, valid_email, FieldErrors, Page};
use crate::{
    auth::{CsrfToken, Principal},
    charasheet::{
        email::{EmailMessage, PASSWORD_RESET_TEMPLATE},
        error::AppError,
        middleware::see_other,
        state::AppState,
    },
};
use axum::{
    extract::{rejection::FormRejection, Extension, Form, Path},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

pub const FORGOTTEN_PASSWORD_CONFIRMATION_PATH: &str = "/forgotten-password-confirmation";
pub const PASSWORD_RESET_CONFIRMATION_PATH: &str = "/password-reset-confirmation";

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ForgottenPasswordForm {
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct PasswordResetForm {
    pub new_password: String,
}

#[utoipa::path(
    get,
    path = "/forgotten-password",
    responses ((status = 200, description = "Empty forgotten-password form")),
    tag = "password"
)]
pub async fn forgotten_form(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    Page::new(Some(&csrf_token), Some(&principal))
        .with("form", json!({ "email": "" }))
        .with_errors(&FieldErrors::default())
        .render(StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/forgotten-password",
    responses (
        (status = 303, description = "Reset link emailed, redirect to the confirmation page"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Form errors")
    ),
    tag = "password"
)]
pub async fn forgotten_submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    form: Result<Form<ForgottenPasswordForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    let user = state.identities.get_by_email(&form.email).await?;

    let mut errors = FieldErrors::default();
    errors.check(!form.email.is_empty(), "email", "Email is required");
    errors.check(
        valid_email(&form.email),
        "email",
        "Must be a valid email address",
    );
    errors.check(user.is_some(), "email", "No matching email found");

    let Some(user) = user.filter(|_| errors.is_empty()) else {
        return Ok(Page::new(Some(&csrf_token), Some(&principal))
            .with("form", json!({ "email": form.email }))
            .with_errors(&errors)
            .render(StatusCode::UNPROCESSABLE_ENTITY));
    };

    let plaintext_token = state.resets.issue(user.id).await?;

    state.mailer.send(&EmailMessage {
        to_email: user.email.clone(),
        template: PASSWORD_RESET_TEMPLATE,
        link: state.config().password_reset_url(&plaintext_token),
    })?;

    info!(user_id = user.id, "Password reset requested");

    Ok(see_other(FORGOTTEN_PASSWORD_CONFIRMATION_PATH, None))
}

#[utoipa::path(
    get,
    path = "/forgotten-password-confirmation",
    responses ((status = 200, description = "Reset link sent")),
    tag = "password"
)]
pub async fn forgotten_confirmation(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    Page::new(Some(&csrf_token), Some(&principal)).render(StatusCode::OK)
}

fn invalid_link(csrf_token: &CsrfToken, principal: &Principal) -> Response {
    Page::new(Some(csrf_token), Some(principal))
        .with("invalid_link", json!(true))
        .render(StatusCode::UNPROCESSABLE_ENTITY)
}

fn reset_page(
    csrf_token: &CsrfToken,
    principal: &Principal,
    plaintext_token: &str,
    errors: &FieldErrors,
    status: StatusCode,
) -> Response {
    Page::new(Some(csrf_token), Some(principal))
        .with("invalid_link", json!(false))
        .with("plaintext_token", json!(plaintext_token))
        .with_errors(errors)
        .render(status)
}

#[utoipa::path(
    get,
    path = "/password-reset/{plaintext_token}",
    params(("plaintext_token" = String, Path, description = "Token from the emailed link")),
    responses (
        (status = 200, description = "New password form"),
        (status = 422, description = "Unknown or expired link")
    ),
    tag = "password"
)]
pub async fn reset_form(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Path(plaintext_token): Path<String>,
) -> Result<Response, AppError> {
    if state.resets.redeem(&plaintext_token).await?.is_none() {
        return Ok(invalid_link(&csrf_token, &principal));
    }

    Ok(reset_page(
        &csrf_token,
        &principal,
        &plaintext_token,
        &FieldErrors::default(),
        StatusCode::OK,
    ))
}

#[utoipa::path(
    post,
    path = "/password-reset/{plaintext_token}",
    params(("plaintext_token" = String, Path, description = "Token from the emailed link")),
    responses (
        (status = 303, description = "Password changed, redirect to the confirmation page"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 422, description = "Unknown or expired link, or form errors")
    ),
    tag = "password"
)]
pub async fn reset_submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Path(plaintext_token): Path<String>,
    form: Result<Form<PasswordResetForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Some(user_id) = state.resets.redeem(&plaintext_token).await? else {
        return Ok(invalid_link(&csrf_token, &principal));
    };

    let form = decode_form(form)?;

    let mut errors = FieldErrors::default();
    check_password_field(&mut errors, "new_password", &form.new_password, true);
    if !errors.is_empty() {
        return Ok(reset_page(
            &csrf_token,
            &principal,
            &plaintext_token,
            &errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        ));
    }

    let hashed_password = state.credentials.hash(&form.new_password).await?;

    // Revoke before updating: a failed update leaves no reusable link behind.
    state.resets.revoke_all(user_id).await?;
    state
        .identities
        .update_hashed_password(user_id, &hashed_password)
        .await?;

    info!(user_id, "Password reset completed");

    Ok(see_other(PASSWORD_RESET_CONFIRMATION_PATH, None))
}

#[utoipa::path(
    get,
    path = "/password-reset-confirmation",
    responses ((status = 200, description = "Password changed")),
    tag = "password"
)]
pub async fn reset_confirmation(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    Page::new(Some(&csrf_token), Some(&principal)).render(StatusCode::OK)
}
