use crate::error::SessionError;

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The engine answered "readyok".
    Ready,
    SearchStarted {
        id: u64,
        fen: String,
    },
    /// The engine ended a search. Not sent for searches replaced by a newer request.
    SearchFinished {
        id: u64,
        best_move: Option<String>,
        ponder: Option<String>,
    },
    /// The engine stalled or its channel failed; a restart may follow.
    Crashed {
        count: u32,
        reason: String,
    },
    /// Retry budget exhausted. No further automatic restarts.
    Fatal(SessionError),
}
