//! Password hashing and the common-password deny-list.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::{collections::HashSet, sync::OnceLock};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid password hashing parameters: {0}")]
    Params(argon2::Error),
    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(argon2::password_hash::Error),
    #[error("password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordCost {
    /// 64 MiB, 3 passes, 1 lane: well above 100 ms per verification on server hardware.
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl PasswordCost {
    /// Smallest cost Argon2 accepts, for tests only.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Hashes and verifies passwords with Argon2id.
#[derive(Clone)]
pub struct CredentialManager {
    hasher: Argon2<'static>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("params", self.hasher.params())
            .finish()
    }
}

impl CredentialManager {
    /// # Errors
    /// Returns an error if the cost parameters are out of Argon2's range.
    pub fn new(cost: PasswordCost) -> Result<Self, CredentialError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(CredentialError::Params)?;
        Ok(Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password into a PHC string with a fresh random salt.
    ///
    /// Argon2 runs on the blocking thread pool.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub async fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(CredentialError::Hash)
        })
        .await?
    }

    /// Compare a candidate password against a stored hash in constant time.
    ///
    /// The parameters embedded in `hashed` are used, so older hashes keep
    /// verifying after the configured cost changes.
    ///
    /// # Errors
    /// Returns an error only when `hashed` is not a valid PHC string.
    pub async fn matches(&self, plaintext: &str, hashed: &str) -> Result<bool, CredentialError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        let hashed = hashed.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hashed).map_err(CredentialError::MalformedHash)?;
            match hasher.verify_password(plaintext.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(err) => Err(CredentialError::MalformedHash(err)),
            }
        })
        .await?
    }
}

/// Static deny-list of passwords too common to accept.
pub struct CommonPasswordSet;

impl CommonPasswordSet {
    fn set() -> &'static HashSet<&'static str> {
        static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
        SET.get_or_init(|| COMMON_PASSWORDS.iter().copied().collect())
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn contains(password: &str) -> bool {
        Self::set().contains(password.to_lowercase().as_str())
    }
}

/// Outcome of checking a password against the caller-side rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordIssue {
    Missing,
    TooShort,
    TooLong,
    TooCommon,
}

/// Apply the non-empty, length and deny-list rules, in that order.
#[must_use]
pub fn check_password(password: &str) -> Option<PasswordIssue> {
    if password.is_empty() {
        Some(PasswordIssue::Missing)
    } else if password.len() < MIN_PASSWORD_LENGTH {
        Some(PasswordIssue::TooShort)
    } else if password.len() > MAX_PASSWORD_LENGTH {
        Some(PasswordIssue::TooLong)
    } else if CommonPasswordSet::contains(password) {
        Some(PasswordIssue::TooCommon)
    } else {
        None
    }
}

const COMMON_PASSWORDS: &[&str] = &[
    "000000", "00000000", "0987654321", "1111", "111111", "11111111", "112233", "121212",
    "123123", "123321", "1234", "12345", "123456", "1234567", "12345678", "123456789",
    "1234567890", "123qwe", "131313", "159753", "1q2w3e", "1q2w3e4r", "1q2w3e4r5t", "222222",
    "232323", "654321", "666666", "696969", "7777777", "777777", "87654321", "888888",
    "987654321", "aaaaaa", "abc123", "abcd1234", "access", "admin", "admin123", "adobe123",
    "amanda", "andrew", "asdfasdf", "asdfgh", "asdfghjkl", "ashley", "azerty", "azertyuiop",
    "bailey", "baseball", "batman", "charlie", "cheese", "chocolate", "computer", "dragon",
    "football", "freedom", "hello", "hello123", "hockey", "hunter", "hunter2", "iloveyou",
    "jennifer", "jessica", "jordan", "killer", "letmein", "login", "lovely", "maggie",
    "master", "matrix", "michael", "monkey", "mustang", "nicole", "ninja", "passw0rd",
    "password", "password1", "password12", "password123", "photoshop", "princess", "qazwsx",
    "qwerty", "qwerty123", "qwertyuiop", "shadow", "soccer", "solo", "starwars", "sunshine",
    "superman", "trustno1", "welcome", "welcome1", "whatever", "zaq1zaq1", "zxcvbnm",
];
