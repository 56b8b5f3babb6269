//! Error taxonomy shared by the dispatcher, workers, and store adapters.

use thiserror::Error;

/// Result alias used throughout the fabric's shared crate.
pub type TaskFabResult<T> = Result<T, TaskFabError>;

/// The error taxonomy of the fabric, following the failure classes a task or
/// a protocol interaction can hit: user-callable failure is represented on
/// the task record itself (`TaskStatus::Failed`), not here.
#[derive(Debug, Error)]
pub enum TaskFabError {
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),
}

impl TaskFabError {
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Transport and protocol errors are recoverable: the caller logs and
    /// continues rather than tearing down the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::Transport(_) | Self::Codec(_)
        )
    }
}
