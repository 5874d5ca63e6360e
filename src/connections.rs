use crate::accounts::{AccountPatch, AccountRepository};
use crate::errors::DbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Kinds of external services an account can link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Spotify,
    GoogleCalendar,
    GoogleFit,
    Twitter,
    Facebook,
    AppleHealth,
    Fitbit,
    Github,
    Notion,
    CustomApi,
}

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        })
    }
}

/// One linked external service, unique by `id` within its parent account
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: ConnectionStatus,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

const fn default_status() -> ConnectionStatus {
    ConnectionStatus::Pending
}

impl Connection {
    /// A new pending connection; `ConnectionManager::add` assigns the
    /// identifier.
    #[must_use]
    pub fn new(kind: ConnectionType, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind,
            name: name.into(),
            description: None,
            status: ConnectionStatus::Pending,
            connected_at: None,
            last_sync: None,
            settings: Map::new(),
            metadata: Map::new(),
            error_message: None,
        }
    }
}

/// Shallow patch for `ConnectionManager::update`. Status and its timestamps
/// move only through `set_status`/`touch_last_sync`, keeping the state
/// machine in one place.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub settings: Option<Map<String, Value>>,
    pub metadata: Option<Map<String, Value>>,
}

/// Manages the `connections` array embedded in account records. All writes
/// go through `AccountRepository::update`; the manager never touches files.
#[derive(Clone)]
pub struct ConnectionManager {
    repo: Arc<AccountRepository>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(repo: Arc<AccountRepository>) -> Self {
        Self { repo }
    }

    /// Appends a connection, assigning an identifier when absent.
    ///
    /// # Errors
    /// `NotFound` when the account does not exist; `UniquenessViolation`
    /// when an explicit id already exists in the account's connections.
    pub fn add(&self, account_id: &str, mut connection: Connection) -> Result<Connection, DbError> {
        let mut connections = self.account_connections(account_id)?;
        if connection.id.is_empty() {
            connection.id = Uuid::new_v4().to_string();
        } else if connections.iter().any(|c| c.id == connection.id) {
            return Err(DbError::UniquenessViolation(format!(
                "connection {} already exists for account {account_id}",
                connection.id
            )));
        }
        connections.push(connection.clone());
        self.store(account_id, connections)?;
        Ok(connection)
    }

    /// All connections of the account, in insertion order.
    pub fn list(&self, account_id: &str) -> Result<Vec<Connection>, DbError> {
        self.account_connections(account_id)
    }

    pub fn get(
        &self,
        account_id: &str,
        connection_id: &str,
    ) -> Result<Option<Connection>, DbError> {
        Ok(self.account_connections(account_id)?.into_iter().find(|c| c.id == connection_id))
    }

    /// Shallow-merges `patch` into the matching connection; `None` when no
    /// sub-record carries the id.
    pub fn update(
        &self,
        account_id: &str,
        connection_id: &str,
        patch: &ConnectionPatch,
    ) -> Result<Option<Connection>, DbError> {
        self.mutate(account_id, connection_id, |connection| {
            if let Some(name) = &patch.name {
                connection.name = name.clone();
            }
            if let Some(description) = &patch.description {
                connection.description = Some(description.clone());
            }
            if let Some(settings) = &patch.settings {
                connection.settings = settings.clone();
            }
            if let Some(metadata) = &patch.metadata {
                connection.metadata = metadata.clone();
            }
            Ok(())
        })
    }

    /// Removes the connection; false when no such id.
    pub fn remove(&self, account_id: &str, connection_id: &str) -> Result<bool, DbError> {
        let mut connections = self.account_connections(account_id)?;
        let before = connections.len();
        connections.retain(|c| c.id != connection_id);
        if connections.len() == before {
            return Ok(false);
        }
        self.store(account_id, connections)?;
        Ok(true)
    }

    /// Drives the caller-owned status state machine: pending → connected,
    /// connected → disconnected, disconnected → connected, any → error,
    /// error → connected. Entering `connected` stamps `connected_at` and
    /// clears any prior error; entering `error` records the message.
    ///
    /// # Errors
    /// `InvalidTransition` for moves outside the graph.
    pub fn set_status(
        &self,
        account_id: &str,
        connection_id: &str,
        status: ConnectionStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Connection>, DbError> {
        self.mutate(account_id, connection_id, |connection| {
            if !transition_allowed(connection.status, status) {
                return Err(DbError::InvalidTransition {
                    from: connection.status.to_string(),
                    to: status.to_string(),
                });
            }
            connection.status = status;
            match status {
                ConnectionStatus::Connected => {
                    connection.connected_at = Some(Utc::now());
                    connection.error_message = None;
                }
                ConnectionStatus::Error => {
                    connection.error_message = error_message.map(str::to_string);
                }
                _ => {}
            }
            Ok(())
        })
    }

    /// Stamps `last_sync`; defaults to now.
    pub fn touch_last_sync(
        &self,
        account_id: &str,
        connection_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Connection>, DbError> {
        self.mutate(account_id, connection_id, |connection| {
            connection.last_sync = Some(at.unwrap_or_else(Utc::now));
            Ok(())
        })
    }

    fn account_connections(&self, account_id: &str) -> Result<Vec<Connection>, DbError> {
        self.repo
            .get_by_id(account_id)
            .map(|record| record.connections)
            .ok_or_else(|| DbError::NotFound(format!("account {account_id}")))
    }

    fn store(&self, account_id: &str, connections: Vec<Connection>) -> Result<(), DbError> {
        let patch = AccountPatch { connections: Some(connections), ..AccountPatch::default() };
        self.repo
            .update(account_id, &patch)?
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("account {account_id}")))
    }

    fn mutate(
        &self,
        account_id: &str,
        connection_id: &str,
        f: impl FnOnce(&mut Connection) -> Result<(), DbError>,
    ) -> Result<Option<Connection>, DbError> {
        let mut connections = self.account_connections(account_id)?;
        let Some(pos) = connections.iter().position(|c| c.id == connection_id) else {
            return Ok(None);
        };
        f(&mut connections[pos])?;
        let updated = connections[pos].clone();
        self.store(account_id, connections)?;
        Ok(Some(updated))
    }
}

const fn transition_allowed(from: ConnectionStatus, to: ConnectionStatus) -> bool {
    use ConnectionStatus as S;
    matches!(
        (from, to),
        (S::Pending, S::Connected)
            | (S::Connected, S::Disconnected)
            | (S::Disconnected, S::Connected)
            | (S::Error, S::Connected)
            | (_, S::Error)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountCreate;
    use crate::test_support::temp_dir;

    fn setup(stem: &str) -> (ConnectionManager, String) {
        let repo = Arc::new(
            AccountRepository::open(temp_dir(stem).join("users.json")).unwrap(),
        );
        let account = repo
            .create(&AccountCreate {
                email: "a@x.com".into(),
                username: "alice".into(),
                password: "Secret123".into(),
                full_name: None,
                github_id: None,
            })
            .unwrap();
        (ConnectionManager::new(repo), account.id)
    }

    #[test]
    fn add_assigns_id_and_defaults_to_pending() {
        let (mgr, acc) = setup("conn_add");
        let added = mgr.add(&acc, Connection::new(ConnectionType::GoogleCalendar, "cal")).unwrap();
        assert!(!added.id.is_empty());
        assert_eq!(added.status, ConnectionStatus::Pending);
        assert_eq!(mgr.list(&acc).unwrap().len(), 1);
    }

    #[test]
    fn add_rejects_duplicate_id_within_account() {
        let (mgr, acc) = setup("conn_dup");
        let mut c = Connection::new(ConnectionType::Fitbit, "steps");
        c.id = "c1".into();
        mgr.add(&acc, c.clone()).unwrap();
        let err = mgr.add(&acc, c).unwrap_err();
        assert!(matches!(err, DbError::UniquenessViolation(_)));
    }

    #[test]
    fn list_on_unknown_account_is_not_found() {
        let (mgr, _) = setup("conn_missing");
        let err = mgr.list("nope").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn lifecycle_stamps_connected_at() {
        let (mgr, acc) = setup("conn_lifecycle");
        let added = mgr.add(&acc, Connection::new(ConnectionType::GoogleCalendar, "cal")).unwrap();
        let connected =
            mgr.set_status(&acc, &added.id, ConnectionStatus::Connected, None).unwrap().unwrap();
        assert_eq!(connected.status, ConnectionStatus::Connected);
        assert!(connected.connected_at.is_some());

        let listed = mgr.list(&acc).unwrap();
        assert_eq!(listed[0].status, ConnectionStatus::Connected);

        mgr.set_status(&acc, &added.id, ConnectionStatus::Disconnected, None).unwrap().unwrap();
        let again =
            mgr.set_status(&acc, &added.id, ConnectionStatus::Connected, None).unwrap().unwrap();
        assert_eq!(again.status, ConnectionStatus::Connected);
    }

    #[test]
    fn error_records_message_and_retry_clears_it() {
        let (mgr, acc) = setup("conn_error");
        let added = mgr.add(&acc, Connection::new(ConnectionType::Spotify, "music")).unwrap();
        let failed = mgr
            .set_status(&acc, &added.id, ConnectionStatus::Error, Some("token expired"))
            .unwrap()
            .unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("token expired"));

        let retried =
            mgr.set_status(&acc, &added.id, ConnectionStatus::Connected, None).unwrap().unwrap();
        assert!(retried.error_message.is_none());
        assert!(retried.connected_at.is_some());
    }

    #[test]
    fn transitions_outside_the_graph_are_rejected() {
        let (mgr, acc) = setup("conn_invalid");
        let added = mgr.add(&acc, Connection::new(ConnectionType::Notion, "notes")).unwrap();
        let err =
            mgr.set_status(&acc, &added.id, ConnectionStatus::Disconnected, None).unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));
    }

    #[test]
    fn update_merges_and_remove_filters() {
        let (mgr, acc) = setup("conn_update");
        let added = mgr.add(&acc, Connection::new(ConnectionType::Github, "repos")).unwrap();
        let patch = ConnectionPatch { name: Some("code".into()), ..ConnectionPatch::default() };
        let updated = mgr.update(&acc, &added.id, &patch).unwrap().unwrap();
        assert_eq!(updated.name, "code");
        assert!(mgr.update(&acc, "nope", &patch).unwrap().is_none());

        assert!(mgr.remove(&acc, &added.id).unwrap());
        assert!(!mgr.remove(&acc, &added.id).unwrap());
        assert!(mgr.list(&acc).unwrap().is_empty());
    }

    #[test]
    fn touch_last_sync_defaults_to_now() {
        let (mgr, acc) = setup("conn_sync");
        let added = mgr.add(&acc, Connection::new(ConnectionType::Fitbit, "steps")).unwrap();
        let synced = mgr.touch_last_sync(&acc, &added.id, None).unwrap().unwrap();
        assert!(synced.last_sync.is_some());
    }
}
