use crate::connections::Connection;
use crate::errors::DbError;
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account as stored in the snapshot. Timestamps serialize as ISO-8601
/// strings; `hashed_password` never leaves the repository through `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub github_id: Option<String>,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

const fn default_active() -> bool {
    true
}

impl AccountRecord {
    pub(crate) fn from_create(candidate: &AccountCreate) -> Result<Self, DbError> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            email: candidate.email.clone(),
            username: candidate.username.clone(),
            full_name: candidate.full_name.clone(),
            is_active: true,
            is_admin: false,
            github_id: candidate.github_id.clone(),
            hashed_password: hash_password(&candidate.password)?,
            created_at: Utc::now(),
            last_login: None,
            connections: Vec::new(),
        })
    }

    /// Verifies a plaintext password against the stored hash.
    #[must_use]
    pub fn verify_password(&self, plain: &str) -> bool {
        PasswordHash::new(&self.hashed_password)
            .is_ok_and(|parsed| Argon2::default().verify_password(plain.as_bytes(), &parsed).is_ok())
    }
}

/// Candidate for `AccountRepository::create`. The plaintext password is
/// hashed on the way in and never stored.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountCreate {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub github_id: Option<String>,
}

/// Field-by-field patch for `AccountRepository::update`; `None` leaves a
/// field untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
    pub github_id: Option<String>,
    pub password: Option<String>,
    pub connections: Option<Vec<Connection>>,
}

/// Public projection of an account: everything except credential material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicAccount {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub github_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&AccountRecord> for PublicAccount {
    fn from(record: &AccountRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            username: record.username.clone(),
            full_name: record.full_name.clone(),
            is_active: record.is_active,
            is_admin: record.is_admin,
            github_id: record.github_id.clone(),
            created_at: record.created_at,
            last_login: record.last_login,
        }
    }
}

/// Argon2id hash in PHC string format with a fresh OS-random salt.
pub(crate) fn hash_password(plain: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbError::Hash(e.to_string()))
}
