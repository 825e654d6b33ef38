//! Transport to the engine process.
//!
//! A channel carries one text line per `post` towards the engine and yields
//! [`ChannelEvent`]s back, in emission order. A `Message` payload may hold
//! several newline-joined lines.

pub mod process;

pub use process::ProcessSpawner;

use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Notification from a worker channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Engine output, possibly several lines.
    Message(String),
    /// Transport failure; the engine is gone or unusable.
    Error(String),
    /// The engine produced output that could not be decoded.
    MessageError(String),
}

/// Sending half of a live channel.
pub trait WorkerChannel: Send {
    /// Send one line to the engine.
    fn post(&mut self, line: &str) -> Result<(), ChannelError>;

    /// Kill the engine. No further events are delivered after this returns.
    fn terminate(&mut self);
}

/// A freshly created channel together with its event stream.
pub struct SpawnedChannel {
    pub channel: Box<dyn WorkerChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Creates worker channels for a target identifier.
pub trait ChannelSpawner: Send + Sync {
    fn spawn(&self, target: &str) -> Result<SpawnedChannel, ChannelError>;
}
