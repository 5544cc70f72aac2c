use super::Page;
use crate::auth::{CsrfToken, Principal};
use axum::{extract::Extension, http::StatusCode, response::Response};

#[utoipa::path(
    get,
    path = "/",
    responses (
        (status = 200, description = "Home page state, with the signed-in user if any")
    ),
    tag = "pages"
)]
pub async fn home(
    Extension(csrf_token): Extension<CsrfToken>,
    Extension(principal): Extension<Principal>,
) -> Response {
    Page::new(Some(&csrf_token), Some(&principal)).render(StatusCode::OK)
}
