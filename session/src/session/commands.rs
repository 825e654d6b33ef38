use tokio::sync::{mpsc, oneshot};

use super::snapshot::{SearchRequest, SessionStatus};
use super::DebugSink;
use crate::config::SessionConfig;
use crate::error::SessionError;

/// Commands sent to the session actor. Each embeds a oneshot for the reply.
pub(crate) enum SessionCommand {
    Init {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Resolves once the search has reported progress.
    Evaluate {
        request: SearchRequest,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Destroy {
        reply: oneshot::Sender<()>,
    },
    Raw {
        text: String,
        on_line: Option<mpsc::UnboundedSender<String>>,
        reply: oneshot::Sender<Result<String, SessionError>>,
    },
    SetDebugStream {
        sink: Option<DebugSink>,
        reply: oneshot::Sender<()>,
    },
    GetConfig {
        reply: oneshot::Sender<SessionConfig>,
    },
    UpdateConfig {
        update: Box<dyn FnOnce(&mut SessionConfig) + Send>,
        reply: oneshot::Sender<SessionConfig>,
    },
    GetStatus {
        reply: oneshot::Sender<SessionStatus>,
    },
}
