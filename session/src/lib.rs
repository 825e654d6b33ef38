//! Session manager for a UCI chess engine behind an asynchronous line channel.
//!
//! The engine process is only reachable through a [`channel::WorkerChannel`]:
//! lines go out one at a time and replies come back later, possibly batched.
//! [`EngineSession`] wraps that channel in a request/response API, correlates
//! replies with the commands that caused them, keeps at most one search in
//! flight and restarts the engine when it stalls or crashes.

pub mod channel;
pub mod config;
pub(crate) mod correlator;
pub mod error;
pub mod session;
pub mod uci;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use channel::{ChannelEvent, ChannelSpawner, ProcessSpawner, SpawnedChannel, WorkerChannel};
pub use config::{SessionConfig, Timing};
pub use error::{ChannelError, SessionError};
pub use session::{
    ActiveSearchInfo, DebugSink, EngineSession, Evaluation, LifecyclePhase, SearchRequest,
    SessionEvent, SessionStatus,
};
pub use uci::{EngineLine, Score};
