use std::time::Duration;

/// Errors surfaced to callers of [`crate::EngineSession`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Engine init timeout: not ready after {attempts} handshake attempts")]
    InitializationTimeout { attempts: u32 },
    #[error("Engine channel fault: {0}")]
    ChannelFault(String),
    #[error("No evaluation received within {0:?}")]
    EvaluationTimeout(Duration),
    #[error("No evaluation received: search ended without progress")]
    NoEvaluation,
    #[error("Engine rejected command: {0}")]
    Protocol(String),
    #[error("Failed to start engine: {0}")]
    Spawn(String),
    #[error("Engine not initialized")]
    NotInitialized,
    #[error("Session destroyed")]
    Destroyed,
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from creating or writing to a worker channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine binary not found: {0}")]
    NotFound(String),
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Channel closed")]
    Closed,
}

impl From<ChannelError> for SessionError {
    fn from(err: ChannelError) -> Self {
        SessionError::Spawn(err.to_string())
    }
}
