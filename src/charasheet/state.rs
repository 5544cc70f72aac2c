//! Application configuration and the shared state handed to middleware and handlers.

use super::email::Mailer;
use crate::{
    auth::{
        reset::DEFAULT_RESET_TOKEN_TTL, CredentialManager, CsrfGuard, PasswordCost,
        PasswordResetLedger, Resolver, SessionStore,
    },
    storage::{
        CharacterStore, IdentityStore, LegacySessionStore, ResetTokenStore,
        DEFAULT_STORAGE_TIMEOUT,
    },
};
use anyhow::{Context, Result};
use chrono::TimeDelta;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

#[derive(Clone, Debug)]
pub struct AppConfig {
    base_url: String,
    session_secrets: Vec<SecretString>,
    secure_cookies: bool,
    storage_timeout: Duration,
    reset_token_ttl: TimeDelta,
    password_cost: PasswordCost,
}

impl AppConfig {
    /// `base_url` prefixes links sent by email; `session_secret` seals new sessions.
    #[must_use]
    pub fn new(base_url: &str, session_secret: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_secrets: vec![session_secret],
            secure_cookies: true,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            reset_token_ttl: DEFAULT_RESET_TOKEN_TTL,
            password_cost: PasswordCost::default(),
        }
    }

    /// Retired secrets, still accepted when opening existing sessions.
    #[must_use]
    pub fn with_old_session_secrets(mut self, secrets: Vec<SecretString>) -> Self {
        self.session_secrets.truncate(1);
        self.session_secrets.extend(secrets);
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl(mut self, ttl: TimeDelta) -> Self {
        self.reset_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_password_cost(mut self, cost: PasswordCost) -> Self {
        self.password_cost = cost;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    #[must_use]
    pub fn reset_token_ttl(&self) -> TimeDelta {
        self.reset_token_ttl
    }

    /// Link emailed to a user asking for a password reset.
    #[must_use]
    pub fn password_reset_url(&self, plaintext_token: &str) -> String {
        format!("{}/password-reset/{plaintext_token}", self.base_url)
    }
}

/// Everything a request needs, built once at startup.
pub struct AppState {
    config: AppConfig,
    pub identities: Arc<dyn IdentityStore>,
    pub characters: Arc<dyn CharacterStore>,
    pub credentials: CredentialManager,
    pub sessions: SessionStore,
    pub resets: PasswordResetLedger,
    pub csrf: CsrfGuard,
    pub resolver: Resolver,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire components around a store implementing every storage concern.
    ///
    /// # Errors
    /// Returns an error if the password cost or session secrets are invalid.
    pub fn new<S>(config: AppConfig, store: Arc<S>, mailer: Arc<dyn Mailer>) -> Result<Self>
    where
        S: IdentityStore + LegacySessionStore + ResetTokenStore + CharacterStore + 'static,
    {
        let credentials = CredentialManager::new(config.password_cost)
            .context("invalid password hashing cost")?;
        let sessions = SessionStore::new(&config.session_secrets, config.secure_cookies)
            .context("invalid session secrets")?;

        Ok(Self {
            identities: store.clone(),
            characters: store.clone(),
            credentials,
            sessions,
            resets: PasswordResetLedger::new(store.clone(), config.reset_token_ttl),
            csrf: CsrfGuard::new(config.secure_cookies),
            resolver: Resolver::new(store.clone(), store),
            mailer,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
