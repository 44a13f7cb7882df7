//! Workspace-wide error type.

use uuid::Uuid;

/// Every fallible operation in Autosign returns this error.
#[derive(Debug, thiserror::Error)]
pub enum AutosignError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Policy not found: {0}")]
    PolicyNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TxNotFound(Uuid),

    #[error("Invalid recipe: {0}")]
    Recipe(String),

    #[error("Task queue error: {0}")]
    Queue(String),

    /// Soft deactivation signal from the safety gate.
    #[error("Keysign disabled for plugin {0}")]
    KeysignDisabled(String),

    #[error("Safety check failed: {0}")]
    Safety(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Emitter {name} failed: {reason}")]
    Emitter { name: String, reason: String },

    /// The relay reported something that must never happen in a healthy session.
    #[error("Keysign protocol violation: {0}")]
    Protocol(String),

    #[error("Invalid keysign request: {0}")]
    InvalidRequest(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Invalid transaction state: {0}")]
    InvalidTxState(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{} of {} items failed: {}", .errors.len(), .total, .errors.join("; "))]
    Aggregate { total: usize, errors: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AutosignError {
    pub fn emitter(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::Emitter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_keysign_disabled(&self) -> bool {
        matches!(self, Self::KeysignDisabled(_))
    }
}

pub type Result<T> = std::result::Result<T, AutosignError>;
