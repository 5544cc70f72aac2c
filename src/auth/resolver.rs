//! Attach an identity to each request.
//!
//! Sources are consulted in a fixed order and the first one to produce an
//! identity wins: the first-party session, then the legacy `sessionid` cookie.

use super::{cookie_value, legacy, Session};
use crate::storage::{Identity, IdentityStore, LegacySessionStore, StorageError};
use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LEGACY_SESSION_COOKIE_NAME: &str = "sessionid";

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    Authenticated(Identity),
    #[default]
    Anonymous,
}

impl Principal {
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Request data visible to identity sources.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub headers: &'a HeaderMap,
    pub session: &'a Session,
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this source has no candidate for the request.
    async fn resolve(&self, credentials: Credentials<'_>)
        -> Result<Option<Identity>, StorageError>;
}

/// `user_id` stored in the first-party session.
pub struct SessionSource {
    identities: Arc<dyn IdentityStore>,
}

impl SessionSource {
    #[must_use]
    pub fn new(identities: Arc<dyn IdentityStore>) -> Self {
        Self { identities }
    }
}

#[async_trait]
impl IdentitySource for SessionSource {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn resolve(
        &self,
        credentials: Credentials<'_>,
    ) -> Result<Option<Identity>, StorageError> {
        let Some(user_id) = credentials.session.user_id() else {
            return Ok(None);
        };

        let identity = self.identities.get_by_id(user_id).await?;
        if identity.is_none() {
            debug!(user_id, "Session refers to an unknown user");
        }
        Ok(identity)
    }
}

/// Session row of the legacy application, found through the `sessionid` cookie.
pub struct LegacySource {
    sessions: Arc<dyn LegacySessionStore>,
    identities: Arc<dyn IdentityStore>,
}

impl LegacySource {
    #[must_use]
    pub fn new(sessions: Arc<dyn LegacySessionStore>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            sessions,
            identities,
        }
    }
}

#[async_trait]
impl IdentitySource for LegacySource {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn resolve(
        &self,
        credentials: Credentials<'_>,
    ) -> Result<Option<Identity>, StorageError> {
        let Some(session_key) = cookie_value(credentials.headers, LEGACY_SESSION_COOKIE_NAME)
        else {
            return Ok(None);
        };

        let Some(row) = self.sessions.get_by_key(&session_key, Utc::now()).await? else {
            return Ok(None);
        };

        let claim = match legacy::decode(&row.session_data) {
            Ok(claim) => claim,
            Err(err) => {
                warn!("Ignoring undecodable legacy session: {err}");
                return Ok(None);
            }
        };

        let Some(user_id) = claim.user_id() else {
            warn!("Ignoring legacy session with an invalid user id");
            return Ok(None);
        };

        self.identities.get_by_id(user_id).await
    }
}

/// Ordered list of identity sources.
pub struct Resolver {
    sources: Vec<Box<dyn IdentitySource>>,
}

impl Resolver {
    /// Session first, legacy cookie second.
    #[must_use]
    pub fn new(identities: Arc<dyn IdentityStore>, legacy: Arc<dyn LegacySessionStore>) -> Self {
        Self::with_sources(vec![
            Box::new(SessionSource::new(identities.clone())),
            Box::new(LegacySource::new(legacy, identities)),
        ])
    }

    #[must_use]
    pub fn with_sources(sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self { sources }
    }

    /// # Errors
    /// Returns an error if any consulted source fails on storage.
    pub async fn resolve(&self, credentials: Credentials<'_>) -> Result<Principal, StorageError> {
        for source in &self.sources {
            if let Some(identity) = source.resolve(credentials).await? {
                debug!(source = source.name(), user_id = identity.id, "Resolved identity");
                return Ok(Principal::Authenticated(identity));
            }
        }

        Ok(Principal::Anonymous)
    }
}
