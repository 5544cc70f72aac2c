use super::token::{self, TokenError};
use crate::storage::{ResetTokenStore, StorageError};
use chrono::{TimeDelta, Utc};
use std::sync::Arc;
use tracing::debug;

/// Reset links stay valid for a day.
pub const DEFAULT_RESET_TOKEN_TTL: TimeDelta = TimeDelta::hours(24);

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Issues and redeems single-use password reset tokens.
///
/// Only `SHA-256(token)` reaches storage; the plaintext exists in the emailed
/// link alone.
#[derive(Clone)]
pub struct PasswordResetLedger {
    store: Arc<dyn ResetTokenStore>,
    ttl: TimeDelta,
}

impl PasswordResetLedger {
    #[must_use]
    pub fn new(store: Arc<dyn ResetTokenStore>, ttl: TimeDelta) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Create a token for `user_id` with the configured lifetime.
    ///
    /// # Errors
    /// Returns an error if token generation or storage fails.
    pub async fn issue(&self, user_id: i64) -> Result<String, ResetError> {
        self.issue_with_ttl(user_id, self.ttl).await
    }

    /// # Errors
    /// Returns an error if token generation or storage fails.
    pub async fn issue_with_ttl(&self, user_id: i64, ttl: TimeDelta) -> Result<String, ResetError> {
        let plaintext = token::generate()?;
        let expires_at = Utc::now() + ttl;
        self.store
            .insert(&token::hash(&plaintext), user_id, expires_at)
            .await?;
        debug!(user_id, %expires_at, "Issued password reset token");
        Ok(plaintext)
    }

    /// The user a live token belongs to. Unknown and expired tokens both give `None`.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    pub async fn redeem(&self, plaintext: &str) -> Result<Option<i64>, StorageError> {
        let row = self
            .store
            .get_by_hash(&token::hash(plaintext), Utc::now())
            .await?;
        Ok(row.map(|row| row.user_id))
    }

    /// Delete every outstanding token of `user_id`.
    ///
    /// # Errors
    /// Returns an error if the delete fails; nothing is removed in that case.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, StorageError> {
        let removed = self.store.delete_all_for_user(user_id).await?;
        debug!(user_id, removed, "Revoked password reset tokens");
        Ok(removed)
    }
}
