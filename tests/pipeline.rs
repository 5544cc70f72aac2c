mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        Request, StatusCode,
    },
    routing::get,
    Router,
};
use charasheet::charasheet::{Pipeline, Stage};
use common::TestApp;
use tower::ServiceExt;

fn assert_security_headers(headers: &axum::http::HeaderMap) {
    let get = |name| headers.get(name).and_then(|value| value.to_str().ok());
    assert_eq!(get(REFERRER_POLICY), Some("origin-when-cross-origin"));
    assert_eq!(get(X_CONTENT_TYPE_OPTIONS), Some("nosniff"));
    assert_eq!(get(X_FRAME_OPTIONS), Some("deny"));
}

#[tokio::test]
async fn every_response_carries_security_headers() -> Result<()> {
    let app = TestApp::new()?;
    let mut browser = app.browser();

    let home = browser.get("/").await?;
    assert_eq!(home.status, StatusCode::OK);
    assert_security_headers(&home.headers);

    let missing = browser.get("/no/such/page").await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_security_headers(&missing.headers);

    let forbidden = browser.post_raw("/login", &[]).await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_security_headers(&forbidden.headers);
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let app = TestApp::new()?;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/version")
                .header("x-request-id", "req-123")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok()),
        Some("req-123")
    );

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/version").body(Body::empty())?)
        .await?;
    assert!(response.headers().contains_key("x-request-id"));
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let doc: serde_json::Value = serde_json::from_slice(&body)?;
    assert!(doc["paths"]["/login"].is_object());
    for (path, schema) in [
        ("/signup", "SignupForm"),
        ("/login", "LoginForm"),
        ("/forgotten-password", "ForgottenPasswordForm"),
        ("/password-reset/{plaintext_token}", "PasswordResetForm"),
        ("/character/{id}/notes_change/", "NotesForm"),
    ] {
        assert!(doc["paths"][path]["post"]["requestBody"].is_object(), "{path}");
        assert!(doc["components"]["schemas"][schema].is_object(), "{schema}");
    }
    assert!(doc["components"]["schemas"]["LoginForm"]["properties"]["password"].is_object());
    Ok(())
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn panics_become_generic_errors() -> Result<()> {
    let router = Pipeline::new([Stage::ContainPanics, Stage::SecurityHeaders])?
        .apply(Router::new().route("/boom", get(boom)));

    let response = router
        .oneshot(Request::builder().uri("/boom").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_security_headers(response.headers());

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"Internal Server Error");
    Ok(())
}
