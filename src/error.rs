//! Error taxonomy of the execution core.

use thiserror::Error;

/// Result alias used across the execution core.
pub type Result<T> = std::result::Result<T, KeelError>;

/// Errors surfaced by the execution core.
///
/// Variants carry owned strings so a captured failure can be cloned and
/// delivered to every party observing a completion: the handler that produced
/// it and any caller blocked on a listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeelError {
    /// A page operation reported a failure to its listener.
    #[error("operation failed: {0}")]
    Operation(String),
    /// Invalid pool or routing configuration, fatal at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A handler thread could not be spawned.
    #[error("worker thread spawn failed: {0}")]
    Spawn(String),
    /// The handler pool has been stopped.
    #[error("handler pool is stopped")]
    Stopped,
}

impl KeelError {
    /// Wraps an arbitrary store-layer failure as an operation error.
    pub fn operation(cause: impl std::fmt::Display) -> Self {
        KeelError::Operation(cause.to_string())
    }
}
