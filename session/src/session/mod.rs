//! The engine session actor and its public handle.

pub(crate) mod actor;
pub(crate) mod commands;
pub mod events;
pub mod snapshot;
pub(crate) mod state;


pub use events::SessionEvent;
pub use snapshot::{ActiveSearchInfo, Evaluation, LifecyclePhase, SearchRequest, SessionStatus};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::channel::{ChannelSpawner, ProcessSpawner};
use crate::config::{SessionConfig, Timing};
use crate::error::SessionError;
use commands::SessionCommand;
use state::SessionState;

/// Observer for every raw line the engine produces.
pub type DebugSink = Box<dyn Fn(&str) + Send + 'static>;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Cheap, cloneable handle to an engine session.
///
/// Construction spawns the session actor and must happen inside a tokio
/// runtime. The engine itself is only started by [`init`](Self::init) or the
/// first request that needs it. Dropping every handle shuts the actor down.
#[derive(Clone)]
pub struct EngineSession {
    cmd_tx: mpsc::Sender<SessionCommand>,
    eval_rx: watch::Receiver<Evaluation>,
    event_tx: broadcast::Sender<SessionEvent>,
    timing: Timing,
}

impl EngineSession {
    /// Session over a child process, configured from the environment.
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_spawner(
            target,
            Arc::new(ProcessSpawner::new()),
            SessionConfig::from_env(),
            Timing::from_env(),
        )
    }

    pub fn with_spawner(
        target: impl Into<String>,
        spawner: Arc<dyn ChannelSpawner>,
        config: SessionConfig,
        timing: Timing,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (eval_tx, eval_rx) = watch::channel(Evaluation::default());
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let state = SessionState::new(
            target.into(),
            spawner,
            config,
            timing,
            eval_tx,
            event_tx.clone(),
        );
        tokio::spawn(actor::run_session_actor(state, cmd_rx));

        Self {
            cmd_tx,
            eval_rx,
            event_tx,
            timing,
        }
    }

    /// Start the engine and wait for the handshake.
    ///
    /// Resolves immediately if the engine is already ready. Fails with
    /// [`SessionError::InitializationTimeout`] once the retry budget is spent.
    /// Calling it again after that starts over with the full budget of
    /// [`Timing::max_consecutive_failures`] attempts.
    pub async fn init(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Init { reply }).await?
    }

    /// Analyse a position. Resolves once the search has reported progress.
    ///
    /// A request made while another search runs replaces it. With `infinite`
    /// unset the engine searches to a fixed depth of 20.
    pub async fn evaluate_fen(
        &self,
        fen: impl Into<String>,
        multipv: u32,
        infinite: bool,
    ) -> Result<(), SessionError> {
        self.init().await?;

        let request = SearchRequest {
            fen: fen.into(),
            multipv,
            infinite,
        };
        let wait = self.timing.eval_start_timeout;
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Evaluate { request, reply: tx })
            .await?;

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Internal("Reply dropped".into())),
            Err(_) => {
                tracing::warn!("No evaluation within {:?}", wait);
                Err(SessionError::EvaluationTimeout(wait))
            }
        }
    }

    /// [`evaluate_fen`](Self::evaluate_fen) with the configured multipv, searching until stopped.
    pub async fn evaluate(&self, fen: impl Into<String>) -> Result<(), SessionError> {
        let multipv = self.config().await?.multipv;
        self.evaluate_fen(fen, multipv, true).await
    }

    /// Forward a stop to the engine.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Stop { reply }).await
    }

    /// Kill the engine and forget all session state. Never triggers recovery.
    pub async fn destroy(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::Destroy { reply }).await
    }

    pub async fn set_debug_stream(
        &self,
        sink: impl Fn(&str) + Send + 'static,
    ) -> Result<(), SessionError> {
        let sink: DebugSink = Box::new(sink);
        self.call(|reply| SessionCommand::SetDebugStream {
            sink: Some(sink),
            reply,
        })
        .await
    }

    pub async fn clear_debug_stream(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionCommand::SetDebugStream { sink: None, reply })
            .await
    }

    pub async fn config(&self) -> Result<SessionConfig, SessionError> {
        self.call(|reply| SessionCommand::GetConfig { reply }).await
    }

    pub async fn set_config(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.update_config(move |current| *current = config)
            .await
            .map(|_| ())
    }

    pub async fn set_max_depth(&self, max_depth: u32) -> Result<(), SessionError> {
        self.update_config(move |config| config.max_depth = max_depth)
            .await
            .map(|_| ())
    }

    /// Apply a change to the config and return the result.
    pub async fn update_config(
        &self,
        update: impl FnOnce(&mut SessionConfig) + Send + 'static,
    ) -> Result<SessionConfig, SessionError> {
        self.call(|reply| SessionCommand::UpdateConfig {
            update: Box::new(update),
            reply,
        })
        .await
    }

    /// Progress of the current search.
    pub fn current_eval(&self) -> Evaluation {
        self.eval_rx.borrow().clone()
    }

    pub fn eval_watch(&self) -> watch::Receiver<Evaluation> {
        self.eval_rx.clone()
    }

    /// Wait until the current search reaches `depth`.
    pub async fn wait_for_depth(
        &self,
        depth: u32,
        timeout: Duration,
    ) -> Result<Evaluation, SessionError> {
        let mut rx = self.eval_rx.clone();
        let result =
            match tokio::time::timeout(timeout, rx.wait_for(|eval| eval.depth >= depth)).await {
                Ok(Ok(eval)) => Ok(eval.clone()),
                Ok(Err(_)) => Err(SessionError::Internal("Session actor closed".into())),
                Err(_) => Err(SessionError::EvaluationTimeout(timeout)),
            };
        result
    }

    /// Send a raw command and return everything the engine answered to it.
    pub async fn command(&self, text: impl Into<String>) -> Result<String, SessionError> {
        self.raw(text.into(), None).await
    }

    /// Like [`command`](Self::command), also forwarding each reply line as it arrives.
    pub async fn command_streaming(
        &self,
        text: impl Into<String>,
        on_line: mpsc::UnboundedSender<String>,
    ) -> Result<String, SessionError> {
        self.raw(text.into(), Some(on_line)).await
    }

    async fn raw(
        &self,
        text: String,
        on_line: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<String, SessionError> {
        self.init().await?;
        self.call(|reply| SessionCommand::Raw {
            text,
            on_line,
            reply,
        })
        .await?
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.call(|reply| SessionCommand::GetStatus { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await
            .map_err(|_| SessionError::Internal("Reply dropped".into()))
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Internal("Session actor closed".into()))
    }
}
