pub mod email;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod pipeline;
pub mod state;

pub use self::{
    email::{CapturingMailer, EmailMessage, LogMailer, Mailer},
    error::AppError,
    openapi::openapi,
    pipeline::{Pipeline, PipelineError, Stage},
    state::{AppConfig, AppState},
};

use crate::{
    auth::Policy,
    storage::{apply_schema, MemoryStore, PgStore},
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use handlers::{character, home, login, logout, password, signup, version};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

/// DSN selecting the in-process store instead of Postgres.
pub const MEMORY_DSN: &str = "memory://";

/// Build every route with its middleware pipeline.
///
/// # Errors
/// Returns an error if a pipeline is misconfigured.
pub fn router(state: Arc<AppState>) -> Result<Router, PipelineError> {
    let public = Pipeline::new([Stage::Csrf])?
        .apply(Router::new().route("/version", get(version::version)));

    let open = Pipeline::new([Stage::Csrf, Stage::Authenticate])?
        .apply(Router::new().route("/", get(home::home)));

    let anonymous = Pipeline::new([
        Stage::Csrf,
        Stage::Authenticate,
        Stage::Guard(Policy::RequireAnonymous),
    ])?
    .apply(
        Router::new()
            .route("/signup", get(signup::form).post(signup::submit))
            .route("/login", get(login::form).post(login::submit))
            .route(
                "/forgotten-password",
                get(password::forgotten_form).post(password::forgotten_submit),
            )
            .route(
                "/forgotten-password-confirmation",
                get(password::forgotten_confirmation),
            )
            .route(
                "/password-reset/:plaintext_token",
                get(password::reset_form).post(password::reset_submit),
            )
            .route(
                "/password-reset-confirmation",
                get(password::reset_confirmation),
            ),
    );

    let authenticated = Pipeline::new([
        Stage::Csrf,
        Stage::Authenticate,
        Stage::Guard(Policy::RequireAuthenticated),
    ])?
    .apply(
        Router::new()
            .route("/logout", post(logout::logout))
            .route(
                "/character/:id/notes_change/",
                get(character::notes_form).post(character::notes_submit),
            ),
    );

    let app = Router::new()
        .merge(public)
        .merge(open)
        .merge(anonymous)
        .merge(authenticated)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .fallback(|| async { AppError::NotFound.into_response() });

    let app = Pipeline::new([Stage::ContainPanics, Stage::SecurityHeaders])?.apply(app);

    Ok(app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    ))
}

/// Connect storage, build the router and serve until interrupted.
///
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot be
/// applied, the configuration is invalid or the listener fails.
pub async fn new(port: u16, dsn: &str, config: AppConfig, automigrate: bool) -> Result<()> {
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
    let timeout = config.storage_timeout();

    let state = if dsn == MEMORY_DSN {
        info!("Using in-memory storage, nothing will be persisted");
        AppState::new(
            config,
            Arc::new(MemoryStore::new().with_timeout(timeout)),
            mailer,
        )?
    } else {
        // Connect to database
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        if automigrate {
            apply_schema(&pool)
                .await
                .context("Failed to apply database schema")?;
        }

        AppState::new(config, Arc::new(PgStore::new(pool, timeout)), mailer)?
    };

    let app = router(Arc::new(state))?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

// Reset links carry the token in the path, so only the route template is recorded.
fn make_span(request: &Request<Body>) -> Span {
    let method = request.method();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str);
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", %method, route, request_id)
}
