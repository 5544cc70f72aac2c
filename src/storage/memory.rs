use super::{
    bounded, Character, CharacterStore, Identity, IdentityStore, LegacySessionRow,
    LegacySessionStore, ResetTokenRow, ResetTokenStore, StorageError, DEFAULT_STORAGE_TIMEOUT,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, time::Duration};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    next_user_id: i64,
    users: HashMap<i64, Identity>,
    legacy_sessions: HashMap<String, LegacySessionRow>,
    reset_tokens: HashMap<Vec<u8>, ResetTokenRow>,
    characters: HashMap<i64, Character>,
}

/// In-process store used by tests and `--dsn memory://`.
///
/// Calls go through the same timeout bound as the Postgres store; `with_latency`
/// delays each call to exercise it.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    latency: Duration,
    timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_user_id: 1,
                ..Tables::default()
            }),
            latency: Duration::ZERO,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn add_legacy_session(
        &self,
        session_key: &str,
        session_data: &str,
        expire_date: DateTime<Utc>,
    ) {
        self.tables.write().await.legacy_sessions.insert(
            session_key.to_string(),
            LegacySessionRow {
                session_key: session_key.to_string(),
                session_data: session_data.to_string(),
                expire_date,
            },
        );
    }

    pub async fn add_character(&self, id: i64, notes: &str) {
        self.tables.write().await.characters.insert(
            id,
            Character {
                id,
                notes: notes.to_string(),
            },
        );
    }

    /// Count stored reset tokens for a user, expired ones included.
    pub async fn reset_token_count(&self, user_id: i64) -> usize {
        self.tables
            .read()
            .await
            .reset_tokens
            .values()
            .filter(|row| row.user_id == user_id)
            .count()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            Ok(self.tables.read().await.users.get(&id).cloned())
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            Ok(self
                .tables
                .read()
                .await
                .users
                .values()
                .find(|user| user.email == email)
                .cloned())
        })
        .await
    }

    async fn insert(&self, email: &str, hashed_password: &str) -> Result<i64, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            let mut tables = self.tables.write().await;
            if tables.users.values().any(|user| user.email == email) {
                return Err(StorageError::Conflict);
            }
            let id = tables.next_user_id;
            tables.next_user_id += 1;
            tables.users.insert(
                id,
                Identity {
                    id,
                    email: email.to_string(),
                    created: Utc::now(),
                    hashed_password: hashed_password.to_string(),
                },
            );
            Ok(id)
        })
        .await
    }

    async fn update_hashed_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<(), StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            if let Some(user) = self.tables.write().await.users.get_mut(&id) {
                user.hashed_password = hashed_password.to_string();
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LegacySessionStore for MemoryStore {
    async fn get_by_key(
        &self,
        session_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LegacySessionRow>, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            Ok(self
                .tables
                .read()
                .await
                .legacy_sessions
                .get(session_key)
                .filter(|row| row.expire_date >= now)
                .cloned())
        })
        .await
    }
}

#[async_trait]
impl ResetTokenStore for MemoryStore {
    async fn insert(
        &self,
        hashed_token: &[u8],
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            let mut tables = self.tables.write().await;
            if tables.reset_tokens.contains_key(hashed_token) {
                return Err(StorageError::Conflict);
            }
            tables.reset_tokens.insert(
                hashed_token.to_vec(),
                ResetTokenRow {
                    user_id,
                    expires_at,
                },
            );
            Ok(())
        })
        .await
    }

    async fn get_by_hash(
        &self,
        hashed_token: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetTokenRow>, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            Ok(self
                .tables
                .read()
                .await
                .reset_tokens
                .get(hashed_token)
                .filter(|row| row.expires_at > now)
                .copied())
        })
        .await
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            let mut tables = self.tables.write().await;
            let before = tables.reset_tokens.len();
            tables.reset_tokens.retain(|_, row| row.user_id != user_id);
            Ok((before - tables.reset_tokens.len()) as u64)
        })
        .await
    }
}

#[async_trait]
impl CharacterStore for MemoryStore {
    async fn get(&self, id: i64) -> Result<Option<Character>, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            Ok(self.tables.read().await.characters.get(&id).cloned())
        })
        .await
    }

    async fn set_notes(&self, id: i64, notes: &str) -> Result<bool, StorageError> {
        bounded(self.timeout, async {
            self.pause().await;
            match self.tables.write().await.characters.get_mut(&id) {
                Some(character) => {
                    character.notes = notes.to_string();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }
}
