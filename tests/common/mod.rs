//! Shared harness: the full router over the in-memory store, plus a small
//! cookie jar so tests can walk multi-request flows like a browser.

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use charasheet::{
    auth::PasswordCost,
    charasheet::{router, AppConfig, AppState, CapturingMailer},
    storage::{IdentityStore, MemoryStore},
};
use secrecy::SecretString;
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};
use tower::ServiceExt;

pub const BASE_URL: &str = "https://charasheet.test";
pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<CapturingMailer>,
    pub state: Arc<AppState>,
}

pub fn config() -> AppConfig {
    AppConfig::new(BASE_URL, SecretString::from("test session secret".to_string()))
        .with_secure_cookies(false)
        .with_password_cost(PasswordCost::minimal())
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Result<Self> {
        let store = Arc::new(store);
        let mailer = Arc::new(CapturingMailer::new());
        let state = Arc::new(AppState::new(config(), store.clone(), mailer.clone())?);
        let router = router(state.clone())?;
        Ok(Self {
            router,
            store,
            mailer,
            state,
        })
    }

    /// Create an account directly in storage.
    pub async fn user(&self, email: &str, password: &str) -> Result<i64> {
        let hashed = self.state.credentials.hash(password).await?;
        Ok(IdentityStore::insert(self.store.as_ref(), email, &hashed).await?)
    }

    pub fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookies: BTreeMap::new(),
        }
    }
}

/// Legacy `session_data` claiming `user_id`, in the uncompressed signed format.
pub fn legacy_session_data(user_id: i64) -> String {
    let payload = format!(r#"{{"_auth_user_id":"{user_id}"}}"#);
    format!(
        "{}:1tEsWd:signature",
        Base64UrlUnpadded::encode_string(payload.as_bytes())
    )
}

pub struct Page {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Page {
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|value| value.to_str().ok())
    }

    pub fn csrf_token(&self) -> Result<String> {
        self.body["csrf_token"]
            .as_str()
            .map(ToString::to_string)
            .context("page has no csrf_token")
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.body["errors"][field].as_str()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.body["authenticated_user"]["email"].as_str()
    }
}

/// Keeps cookies between requests.
pub struct Browser {
    router: Router,
    pub cookies: BTreeMap<String, String>,
}

impl Browser {
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn store_cookies(&mut self, response: &Response) {
        for value in response.headers().get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let pair = value.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                if value.is_empty() {
                    self.cookies.remove(name.trim());
                } else {
                    self.cookies
                        .insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }
    }

    pub async fn send(&mut self, request: Request<Body>) -> Result<Page> {
        let response = self.router.clone().oneshot(request).await?;
        self.store_cookies(&response);

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(Page {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&mut self, path: &str) -> Result<Page> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(COOKIE, self.cookie_header())
            .body(Body::empty())?;
        self.send(request).await
    }

    /// POST a urlencoded form as is, without adding a CSRF token.
    pub async fn post_raw(&mut self, path: &str, fields: &[(&str, &str)]) -> Result<Page> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(COOKIE, self.cookie_header())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?;
        self.send(request).await
    }

    /// GET `form_path` for a token, then POST `fields` with it to `path`.
    pub async fn submit(
        &mut self,
        form_path: &str,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<Page> {
        let token = self.get(form_path).await?.csrf_token()?;
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", token.as_str()));
        self.post_raw(path, &fields).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<Page> {
        self.submit(
            "/login",
            "/login",
            &[("email", email), ("password", password)],
        )
        .await
    }
}
