use super::{
    bounded, is_unique_violation, Character, CharacterStore, Identity, IdentityStore,
    LegacySessionRow, LegacySessionStore, ResetTokenRow, ResetTokenStore, StorageError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Postgres-backed implementation of every storage trait.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn identity_from_row(row: &sqlx::postgres::PgRow) -> Result<Identity, sqlx::Error> {
    Ok(Identity {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        created: row.try_get("date_joined")?,
        hashed_password: row.try_get("password")?,
    })
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError> {
        let query = "SELECT id, date_joined, email, password FROM common_user WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        bounded(self.timeout, async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(row.as_ref().map(identity_from_row).transpose()?)
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StorageError> {
        let query = "SELECT id, date_joined, email, password FROM common_user WHERE email = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        bounded(self.timeout, async {
            let row = sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(row.as_ref().map(identity_from_row).transpose()?)
        })
        .await
    }

    async fn insert(&self, email: &str, hashed_password: &str) -> Result<i64, StorageError> {
        let query = r"
            INSERT INTO common_user
                (date_joined, username, email, password, is_active, first_name, last_name, is_superuser, is_staff)
            VALUES (NOW(), $1, $1, $2, TRUE, '', '', FALSE, FALSE)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        bounded(self.timeout, async {
            match sqlx::query_scalar::<_, i64>(query)
                .bind(email)
                .bind(hashed_password)
                .fetch_one(&self.pool)
                .instrument(span)
                .await
            {
                Ok(id) => Ok(id),
                Err(err) if is_unique_violation(&err) => Err(StorageError::Conflict),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn update_hashed_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<(), StorageError> {
        let query = "UPDATE common_user SET password = $1 WHERE id = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        bounded(self.timeout, async {
            sqlx::query(query)
                .bind(hashed_password)
                .bind(id)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LegacySessionStore for PgStore {
    async fn get_by_key(
        &self,
        session_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LegacySessionRow>, StorageError> {
        let query = r"
            SELECT session_key, session_data, expire_date
            FROM django_session
            WHERE session_key = $1 AND expire_date >= $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        bounded(self.timeout, async {
            let row = sqlx::query(query)
                .bind(session_key)
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            let Some(row) = row else {
                return Ok(None);
            };
            Ok(Some(LegacySessionRow {
                session_key: row.try_get("session_key")?,
                session_data: row.try_get("session_data")?,
                expire_date: row.try_get("expire_date")?,
            }))
        })
        .await
    }
}

#[async_trait]
impl ResetTokenStore for PgStore {
    async fn insert(
        &self,
        hashed_token: &[u8],
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let query =
            "INSERT INTO password_resets (hashed_token, user_id, expiry) VALUES ($1, $2, $3)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        bounded(self.timeout, async {
            sqlx::query(query)
                .bind(hashed_token)
                .bind(user_id)
                .bind(expires_at)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(())
        })
        .await
    }

    async fn get_by_hash(
        &self,
        hashed_token: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<ResetTokenRow>, StorageError> {
        let query =
            "SELECT user_id, expiry FROM password_resets WHERE hashed_token = $1 AND expiry > $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        bounded(self.timeout, async {
            let row = sqlx::query_as::<_, (i64, DateTime<Utc>)>(query)
                .bind(hashed_token)
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(row.map(|(user_id, expires_at)| ResetTokenRow {
                user_id,
                expires_at,
            }))
        })
        .await
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError> {
        let query = "DELETE FROM password_resets WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        bounded(self.timeout, async {
            let result = sqlx::query(query)
                .bind(user_id)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[async_trait]
impl CharacterStore for PgStore {
    async fn get(&self, id: i64) -> Result<Option<Character>, StorageError> {
        let query = "SELECT id, notes FROM character_character WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        bounded(self.timeout, async {
            let row = sqlx::query_as::<_, (i64, String)>(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await?;
            Ok(row.map(|(id, notes)| Character { id, notes }))
        })
        .await
    }

    async fn set_notes(&self, id: i64, notes: &str) -> Result<bool, StorageError> {
        let query = "UPDATE character_character SET notes = $1 WHERE id = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        bounded(self.timeout, async {
            let result = sqlx::query(query)
                .bind(notes)
                .bind(id)
                .execute(&self.pool)
                .instrument(span)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}

/// Create the tables this service reads and writes when they are missing.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement.as_str()
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_sql_statements_skips_comments() {
        let statements = split_sql_statements(
            "-- users\nCREATE TABLE a (\n  id INT\n);\n\nCREATE INDEX b ON a (id);\n",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert_eq!(statements[1], "CREATE INDEX b ON a (id);");
    }

    #[test]
    fn bundled_schema_creates_every_table() {
        let statements = split_sql_statements(SCHEMA_SQL);
        for table in [
            "common_user",
            "django_session",
            "password_resets",
            "character_character",
        ] {
            assert!(
                statements
                    .iter()
                    .any(|s| s.contains(&format!("CREATE TABLE IF NOT EXISTS {table}"))),
                "missing table {table}"
            );
        }
    }
}
