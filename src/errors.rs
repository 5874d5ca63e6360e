use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Uniqueness violation: {0}")]
    UniquenessViolation(String),

    #[error("Corrupt storage: {0}")]
    CorruptStorage(String),

    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    #[error("Invalid connection status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Password hash error: {0}")]
    Hash(String),
}
