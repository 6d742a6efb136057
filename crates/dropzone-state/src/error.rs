//! Error types for the dropzone state store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failures raised by [`StateStore`](crate::StateStore) and the repository
/// implementations built on it.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// A keyed row did not exist. `collection` names the table or nested
    /// list that was searched.
    #[error("{collection} not found: {id}")]
    NotFound { collection: &'static str, id: String },

    /// An insert-only write found the key already taken.
    #[error("{collection} already exists: {id}")]
    Conflict { collection: &'static str, id: String },
}

impl StateError {
    pub(crate) fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        StateError::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }
}
