//! Storage collaborators used by the authentication core.
//!
//! Each concern gets its own trait so handlers and middleware only see the
//! operations they need. `PgStore` implements all of them against Postgres and
//! `MemoryStore` implements them in process for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{apply_schema, PgStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{future::Future, time::Duration};

/// Default per-call bound for storage operations.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// A registered user.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub created: DateTime<Utc>,
    #[serde(skip)]
    pub hashed_password: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

/// Row of the legacy session table.
#[derive(Debug, Clone)]
pub struct LegacySessionRow {
    pub session_key: String,
    pub session_data: String,
    pub expire_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetTokenRow {
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    pub id: i64,
    pub notes: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("record already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Run a storage future with an upper bound on its duration.
///
/// # Errors
/// Returns `StorageError::Timeout` when `limit` elapses first, otherwise the
/// future's own result.
pub async fn bounded<T, F>(limit: Duration, future: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or(Err(StorageError::Timeout(limit)))
}

/// SQLSTATE `23505`.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
    )
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StorageError>;

    /// Insert a user and return its id. A duplicate email is `StorageError::Conflict`.
    async fn insert(&self, email: &str, hashed_password: &str) -> Result<i64, StorageError>;

    async fn update_hashed_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait LegacySessionStore: Send + Sync {
    /// Look up a session row whose `expire_date` is not before `now`.
    async fn get_by_key(
        &self,
        session_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LegacySessionRow>, StorageError>;
}

#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn insert(
        &self,
        hashed_token: &[u8],
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Only rows with `expires_at` after `now` are returned.
    async fn get_by_hash(
        &self,
        hashed_token: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetTokenRow>, StorageError>;

    /// Delete every token of `user_id` in a single statement, returns the count removed.
    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Character>, StorageError>;

    /// Returns `false` when no character has this id.
    async fn set_notes(&self, id: i64, notes: &str) -> Result<bool, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_result() {
        let value = bounded(Duration::from_secs(1), async { Ok::<_, StorageError>(7) }).await;
        assert_eq!(value.ok(), Some(7));
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StorageError>(())
        })
        .await;
        assert!(matches!(result, Err(StorageError::Timeout(d)) if d == limit));
    }

    #[test]
    fn identity_debug_hides_hash() {
        let identity = Identity {
            id: 1,
            email: "a@example.com".to_string(),
            created: Utc::now(),
            hashed_password: "$argon2id$secret".to_string(),
        };
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(rendered.contains("a@example.com"));
    }
}
