//! Ordered middleware stages.
//!
//! A `Pipeline` is validated once when routes are built, then applied to a
//! router. Stage order is fixed, outermost first:
//! panic containment, security headers, CSRF, authentication, route guard.

use super::{middleware, state::AppState};
use crate::auth::Policy;
use axum::{
    extract::{Extension, Request},
    http::{
        header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        HeaderValue,
    },
    middleware::{from_fn, Next},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ContainPanics,
    SecurityHeaders,
    Csrf,
    Authenticate,
    Guard(Policy),
}

impl Stage {
    const fn rank(self) -> u8 {
        match self {
            Self::ContainPanics => 0,
            Self::SecurityHeaders => 1,
            Self::Csrf => 2,
            Self::Authenticate => 3,
            Self::Guard(_) => 4,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("stage {later:?} must run before {earlier:?}")]
    OutOfOrder { earlier: Stage, later: Stage },
    #[error("stage {0:?} appears more than once")]
    Duplicate(Stage),
    #[error("route guard needs the authenticate stage")]
    GuardWithoutAuthentication,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// # Errors
    /// Returns an error when stages are missing, repeated or out of order,
    /// or when a guard is not preceded by authentication.
    pub fn new(stages: impl Into<Vec<Stage>>) -> Result<Self, PipelineError> {
        let stages = stages.into();
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        for pair in stages.windows(2) {
            let (earlier, later) = (pair[0], pair[1]);
            if earlier.rank() == later.rank() {
                return Err(PipelineError::Duplicate(later));
            }
            if earlier.rank() > later.rank() {
                return Err(PipelineError::OutOfOrder { earlier, later });
            }
        }

        let has_guard = stages.iter().any(|stage| matches!(stage, Stage::Guard(_)));
        if has_guard && !stages.contains(&Stage::Authenticate) {
            return Err(PipelineError::GuardWithoutAuthentication);
        }

        Ok(Self { stages })
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wrap every route of `router`; the first stage ends up outermost.
    #[must_use]
    pub fn apply(&self, router: Router) -> Router {
        self.stages
            .iter()
            .rev()
            .fold(router, |router, stage| match *stage {
                Stage::ContainPanics => {
                    router.layer(CatchPanicLayer::custom(middleware::contain_panic))
                }
                Stage::SecurityHeaders => router
                    .layer(SetResponseHeaderLayer::overriding(
                        REFERRER_POLICY,
                        HeaderValue::from_static("origin-when-cross-origin"),
                    ))
                    .layer(SetResponseHeaderLayer::overriding(
                        X_CONTENT_TYPE_OPTIONS,
                        HeaderValue::from_static("nosniff"),
                    ))
                    .layer(SetResponseHeaderLayer::overriding(
                        X_FRAME_OPTIONS,
                        HeaderValue::from_static("deny"),
                    )),
                Stage::Csrf => router.layer(from_fn(middleware::csrf)),
                Stage::Authenticate => router.layer(from_fn(middleware::authenticate)),
                Stage::Guard(policy) => router.layer(from_fn(
                    move |state: Extension<Arc<AppState>>, request: Request, next: Next| {
                        middleware::enforce(policy, state, request, next)
                    },
                )),
            })
    }
}
