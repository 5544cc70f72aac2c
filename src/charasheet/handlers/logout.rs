use super::redirect_with_session;
use crate::{
    auth::{guard::HOME_PATH, Session},
    charasheet::{error::AppError, state::AppState},
};
use axum::{extract::Extension, response::Response};
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/logout",
    responses (
        (status = 303, description = "Signed out, redirect to /"),
        (status = 403, description = "Missing or invalid CSRF token")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(mut session): Extension<Session>,
) -> Result<Response, AppError> {
    session.clear_user_id();
    redirect_with_session(&state, &session, HOME_PATH)
}
