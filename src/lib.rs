pub mod accounts;
pub mod collection;
pub mod connections;
pub mod errors;
pub mod fsutil;
pub mod logger;
pub mod query;
pub mod types;

#[cfg(test)]
mod test_support;

use crate::accounts::AccountRepository;
use crate::collection::Collection;
use crate::connections::ConnectionManager;
use crate::errors::DbError;
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Store configuration: where durable units live and the database name.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub data_dir: PathBuf,
    pub db_name: String,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data"), db_name: "meverse".to_string() }
    }
}

impl StoreOptions {
    /// Reads `MEVERSE_DATA_DIR` and `MEVERSE_DB`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = std::env::var("MEVERSE_DATA_DIR").ok();
        let db_name = std::env::var("MEVERSE_DB").unwrap_or_else(|_| "meverse".to_string());
        Self { data_dir: fsutil::normalize_data_dir(data_dir.as_deref()), db_name }
    }
}

/// The main database handle.
///
/// Construct once at process start and pass (or inject) into collaborators;
/// there is no ambient global instance. Per-collection durable units live in
/// `{data_dir}/{db_name}/`, the account snapshot in
/// `{data_dir}/users/users.json`.
pub struct Database {
    options: StoreOptions,
    db_dir: PathBuf,
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
    accounts: Arc<AccountRepository>,
}

impl Database {
    /// Opens or creates the database under `options.data_dir`.
    pub fn open(options: StoreOptions) -> Result<Self, DbError> {
        let db_dir = options.data_dir.join(&options.db_name);
        fs::create_dir_all(&db_dir)?;
        // Logging init is best-effort; the embedding application may already
        // own the global logger.
        let _ = logger::init_for_db_in(&options.data_dir, &options.db_name);
        let accounts_path = options.data_dir.join("users").join("users.json");
        let accounts = Arc::new(AccountRepository::open(accounts_path)?);
        Ok(Self { options, db_dir, collections: RwLock::new(HashMap::new()), accounts })
    }

    /// Opens the database with `StoreOptions::default()`.
    pub fn new() -> Result<Self, DbError> {
        Self::open(StoreOptions::default())
    }

    /// Returns the handle for `name`, creating the collection's durable unit
    /// on first use. Idempotent; handles live for the process lifetime.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        if let Some(col) = self.collections.read().get(name) {
            return Ok(col.clone());
        }
        let mut cols = self.collections.write();
        if let Some(col) = cols.get(name) {
            return Ok(col.clone());
        }
        let col = Arc::new(Collection::new(&self.db_dir, name)?);
        cols.insert(name.to_string(), col.clone());
        Ok(col)
    }

    /// Names of the collections with a durable unit on disk, sorted.
    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.db_dir)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "json") {
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// The account repository (exclusively for account data).
    #[must_use]
    pub fn accounts(&self) -> Arc<AccountRepository> {
        self.accounts.clone()
    }

    /// A manager for the linked-connection sub-collection, writing through
    /// the shared account repository.
    #[must_use]
    pub fn connections(&self) -> ConnectionManager {
        ConnectionManager::new(self.accounts.clone())
    }

    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}
