//! Error types for session memory.

use synapse_core::SynapseError;

/// Errors from the session memory façade.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("identifier cannot be empty: {0}")]
    EmptyIdentifier(&'static str),
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<SynapseError> for MemoryError {
    fn from(err: SynapseError) -> Self {
        MemoryError::Storage(err.to_string())
    }
}
