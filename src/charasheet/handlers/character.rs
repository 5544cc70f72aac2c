use super::{decode_form, Page};
use crate::{
    auth::{CsrfToken, Principal},
    charasheet::{error::AppError, state::AppState},
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

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct NotesForm {
    pub notes: String,
}

#[utoipa::path(
    get,
    path = "/character/{id}/notes_change/",
    params(("id" = i64, Path, description = "Character id")),
    responses (
        (status = 200, description = "Character notes"),
        (status = 303, description = "Not signed in, redirect to /login"),
        (status = 404, description = "No such character")
    ),
    tag = "character"
)]
pub async fn notes_form(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let character = state.characters.get(id).await?.ok_or(AppError::NotFound)?;

    Ok(Page::new(Some(&csrf_token), Some(&principal))
        .with("character", json!(character))
        .render(StatusCode::OK))
}

#[utoipa::path(
    post,
    path = "/character/{id}/notes_change/",
    params(("id" = i64, Path, description = "Character id")),
    responses (
        (status = 200, description = "Notes saved"),
        (status = 303, description = "Not signed in, redirect to /login"),
        (status = 403, description = "Missing or invalid CSRF token"),
        (status = 404, description = "No such character")
    ),
    tag = "character"
)]
pub async fn notes_submit(
    Extension(state): Extension<Arc<AppState>>,
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    form: Result<Form<NotesForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = decode_form(form)?;

    if !state.characters.set_notes(id, &form.notes).await? {
        return Err(AppError::NotFound);
    }

    let character = state.characters.get(id).await?.ok_or(AppError::NotFound)?;

    info!(
        character_id = id,
        user_id = principal.identity().map(|identity| identity.id),
        "Character notes updated"
    );

    Ok(Page::new(Some(&csrf_token), Some(&principal))
        .with("character", json!(character))
        .render(StatusCode::OK))
}
