use crate::{
    auth::{password::CredentialError, reset::ResetError, session::SessionError, token::TokenError},
    storage::StorageError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures that end a request without a page of their own.
///
/// Clients only ever see a generic status; the detail goes to the log.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Reset(#[from] ResetError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(reason) => {
                tracing::debug!("Bad request: {reason}");
                (StatusCode::BAD_REQUEST, "Bad Request").into_response()
            }
            Self::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            err => {
                error!("Request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn storage_errors_are_generic_500s() {
        let response = AppError::from(StorageError::Timeout(Duration::from_secs(3))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(
            AppError::BadRequest("form".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
