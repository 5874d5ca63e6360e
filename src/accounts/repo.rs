use super::record::{AccountCreate, AccountPatch, AccountRecord, PublicAccount, hash_password};
use crate::errors::DbError;
use crate::types::DocumentId;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// In-memory state: primary map plus insertion order and the two normalized
/// secondary indices. The four structures always mutate together.
#[derive(Default)]
struct AccountMaps {
    by_id: HashMap<DocumentId, AccountRecord>,
    order: Vec<DocumentId>,
    by_email: HashMap<String, DocumentId>,
    by_username: HashMap<String, DocumentId>,
}

impl AccountMaps {
    fn insert(&mut self, record: AccountRecord) {
        self.by_email.insert(normalize(&record.email), record.id.clone());
        self.by_username.insert(normalize(&record.username), record.id.clone());
        self.order.push(record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    fn remove(&mut self, id: &str) -> Option<(AccountRecord, usize)> {
        let record = self.by_id.remove(id)?;
        self.by_email.remove(&normalize(&record.email));
        self.by_username.remove(&normalize(&record.username));
        let pos = self.order.iter().position(|x| x == id).unwrap_or(self.order.len());
        if pos < self.order.len() {
            self.order.remove(pos);
        }
        Some((record, pos))
    }

    /// Reinserts a removed record at its original position.
    fn restore(&mut self, record: AccountRecord, pos: usize) {
        self.by_email.insert(normalize(&record.email), record.id.clone());
        self.by_username.insert(normalize(&record.username), record.id.clone());
        self.order.insert(pos.min(self.order.len()), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    fn snapshot(&self) -> Vec<AccountRecord> {
        self.order.iter().filter_map(|id| self.by_id.get(id).cloned()).collect()
    }
}

/// All index keys are lower-cased here and nowhere else.
fn normalize(s: &str) -> String {
    s.to_lowercase()
}

/// Account repository: O(1) lookups by id, email, and username, with
/// case-insensitive uniqueness on the latter two and full-snapshot
/// persistence to a single dedicated file.
pub struct AccountRepository {
    path: PathBuf,
    maps: RwLock<AccountMaps>,
}

impl AccountRepository {
    /// Opens the snapshot at `path`, creating an empty one when missing. A
    /// malformed snapshot is logged, reinitialized empty, and persisted
    /// rather than treated as fatal.
    pub fn open(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let repo = Self { path, maps: RwLock::new(AccountMaps::default()) };
        repo.load()?;
        Ok(repo)
    }

    fn load(&self) -> Result<(), DbError> {
        if !self.path.exists() {
            return self.persist(&[]);
        }
        let raw = fs::read_to_string(&self.path)?;
        let records: Vec<AccountRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                // Recovered locally, reported for operator visibility.
                let err =
                    DbError::CorruptStorage(format!("snapshot {}: {e}", self.path.display()));
                log::error!("{err}; reinitializing as empty");
                return self.persist(&[]);
            }
        };
        let mut maps = self.maps.write();
        for record in records {
            if maps.by_id.contains_key(&record.id)
                || maps.by_email.contains_key(&normalize(&record.email))
                || maps.by_username.contains_key(&normalize(&record.username))
            {
                log::warn!("skipping account {} with duplicate id, email, or username", record.id);
                continue;
            }
            maps.insert(record);
        }
        Ok(())
    }

    fn persist(&self, records: &[AccountRecord]) -> Result<(), DbError> {
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, body)?;
        Ok(())
    }

    /// Creates a new account: assigns an identifier, hashes the password,
    /// indexes it, and persists the snapshot.
    ///
    /// # Errors
    /// `UniquenessViolation` when the normalized email or username is taken.
    /// A failed write rolls the in-memory maps back before propagating.
    pub fn create(&self, candidate: &AccountCreate) -> Result<AccountRecord, DbError> {
        let mut maps = self.maps.write();
        if maps.by_email.contains_key(&normalize(&candidate.email)) {
            return Err(DbError::UniquenessViolation(format!(
                "email {} is already registered",
                candidate.email
            )));
        }
        if maps.by_username.contains_key(&normalize(&candidate.username)) {
            return Err(DbError::UniquenessViolation(format!(
                "username {} is already taken",
                candidate.username
            )));
        }
        let record = AccountRecord::from_create(candidate)?;
        maps.insert(record.clone());
        if let Err(e) = self.persist(&maps.snapshot()) {
            maps.remove(&record.id);
            return Err(e);
        }
        Ok(record)
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<AccountRecord> {
        self.maps.read().by_id.get(id).cloned()
    }

    #[must_use]
    pub fn get_by_email(&self, email: &str) -> Option<AccountRecord> {
        let maps = self.maps.read();
        maps.by_email.get(&normalize(email)).and_then(|id| maps.by_id.get(id)).cloned()
    }

    #[must_use]
    pub fn get_by_username(&self, username: &str) -> Option<AccountRecord> {
        let maps = self.maps.read();
        maps.by_username.get(&normalize(username)).and_then(|id| maps.by_id.get(id)).cloned()
    }

    #[must_use]
    pub fn email_exists(&self, email: &str) -> bool {
        self.maps.read().by_email.contains_key(&normalize(email))
    }

    #[must_use]
    pub fn username_exists(&self, username: &str) -> bool {
        self.maps.read().by_username.contains_key(&normalize(username))
    }

    /// Applies `patch` to the account; `None` when the id is unknown.
    ///
    /// Email and username changes re-check uniqueness (excluding this
    /// record's own entries) before anything mutates. Index relocation,
    /// primary-map replacement, and snapshot persistence form one logical
    /// step: a failed write restores the pre-update maps exactly.
    pub fn update(&self, id: &str, patch: &AccountPatch) -> Result<Option<AccountRecord>, DbError> {
        let mut maps = self.maps.write();
        let Some(current) = maps.by_id.get(id).cloned() else {
            return Ok(None);
        };

        let mut next = current.clone();
        if let Some(email) = &patch.email {
            if normalize(email) != normalize(&current.email)
                && maps.by_email.contains_key(&normalize(email))
            {
                return Err(DbError::UniquenessViolation(format!(
                    "email {email} is already registered"
                )));
            }
            next.email = email.clone();
        }
        if let Some(username) = &patch.username {
            if normalize(username) != normalize(&current.username)
                && maps.by_username.contains_key(&normalize(username))
            {
                return Err(DbError::UniquenessViolation(format!(
                    "username {username} is already taken"
                )));
            }
            next.username = username.clone();
        }
        if let Some(full_name) = &patch.full_name {
            next.full_name = Some(full_name.clone());
        }
        if let Some(is_active) = patch.is_active {
            next.is_active = is_active;
        }
        if let Some(is_admin) = patch.is_admin {
            next.is_admin = is_admin;
        }
        if let Some(github_id) = &patch.github_id {
            next.github_id = Some(github_id.clone());
        }
        if let Some(password) = &patch.password {
            next.hashed_password = hash_password(password)?;
        }
        if let Some(connections) = &patch.connections {
            for (i, c) in connections.iter().enumerate() {
                if connections[..i].iter().any(|prior| prior.id == c.id) {
                    return Err(DbError::UniquenessViolation(format!(
                        "duplicate connection id {} for account {id}",
                        c.id
                    )));
                }
            }
            next.connections = connections.clone();
        }

        maps.by_email.remove(&normalize(&current.email));
        maps.by_email.insert(normalize(&next.email), current.id.clone());
        maps.by_username.remove(&normalize(&current.username));
        maps.by_username.insert(normalize(&next.username), current.id.clone());
        maps.by_id.insert(id.to_string(), next.clone());

        if let Err(e) = self.persist(&maps.snapshot()) {
            maps.by_email.remove(&normalize(&next.email));
            maps.by_email.insert(normalize(&current.email), current.id.clone());
            maps.by_username.remove(&normalize(&next.username));
            maps.by_username.insert(normalize(&current.username), current.id.clone());
            maps.by_id.insert(id.to_string(), current);
            return Err(e);
        }
        Ok(Some(next))
    }

    /// Removes the account from all maps and persists.
    pub fn delete(&self, id: &str) -> Result<bool, DbError> {
        let mut maps = self.maps.write();
        let Some((record, pos)) = maps.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&maps.snapshot()) {
            maps.restore(record, pos);
            return Err(e);
        }
        Ok(true)
    }

    /// All accounts in insertion order, without credential material.
    #[must_use]
    pub fn list(&self) -> Vec<PublicAccount> {
        let maps = self.maps.read();
        maps.order.iter().filter_map(|id| maps.by_id.get(id)).map(PublicAccount::from).collect()
    }

    /// Stamps `last_login` with the current time and persists. Returns false
    /// when the id is unknown.
    pub fn touch_last_login(&self, id: &str) -> Result<bool, DbError> {
        let mut maps = self.maps.write();
        let prior = match maps.by_id.get_mut(id) {
            Some(record) => record.last_login.replace(Utc::now()),
            None => return Ok(false),
        };
        if let Err(e) = self.persist(&maps.snapshot()) {
            if let Some(record) = maps.by_id.get_mut(id) {
                record.last_login = prior;
            }
            return Err(e);
        }
        Ok(true)
    }
}
