use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use super::events::SessionEvent;
use super::snapshot::{
    ActiveSearchInfo, Evaluation, LifecyclePhase, SearchRequest, SessionStatus,
};
use super::DebugSink;
use crate::channel::{ChannelEvent, ChannelSpawner, SpawnedChannel, WorkerChannel};
use crate::config::{SessionConfig, Timing};
use crate::correlator::{CommandQueue, Completion, QueuedCommand, Routed, Terminal};
use crate::error::SessionError;
use crate::uci::{
    go_command, is_no_reply, parse_best_move, parse_progress_line, position_command,
    set_option_command,
};

type EvalWaiter = oneshot::Sender<Result<(), SessionError>>;

struct LiveChannel {
    channel: Box<dyn WorkerChannel>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

struct StagedSearch {
    request: SearchRequest,
    waiters: Vec<EvalWaiter>,
}

struct ActiveSearch {
    id: u64,
    fen: String,
    stop_sent: bool,
    /// Callers waiting for this search's first progress line.
    waiters: Vec<EvalWaiter>,
}

enum Failure {
    HandshakeStalled,
    ChannelFault(String),
}

/// Internal mutable state, owned entirely by the session actor. No locks.
pub(crate) struct SessionState {
    target: String,
    spawner: Arc<dyn ChannelSpawner>,
    pub config: SessionConfig,
    timing: Timing,
    channel: Option<LiveChannel>,
    phase: LifecyclePhase,
    queue: CommandQueue,
    searching: bool,
    staged: Option<StagedSearch>,
    active: Option<ActiveSearch>,
    next_search_id: u64,
    last_request: Option<SearchRequest>,
    crash_count: u32,
    watchdog: Option<Instant>,
    advance_at: Option<Instant>,
    init_waiters: Vec<oneshot::Sender<Result<(), SessionError>>>,
    debug_sink: Option<DebugSink>,
    eval_tx: watch::Sender<Evaluation>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub fn new(
        target: String,
        spawner: Arc<dyn ChannelSpawner>,
        config: SessionConfig,
        timing: Timing,
        eval_tx: watch::Sender<Evaluation>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            target,
            spawner,
            config,
            timing,
            channel: None,
            phase: LifecyclePhase::Uninitialized,
            queue: CommandQueue::default(),
            searching: false,
            staged: None,
            active: None,
            next_search_id: 0,
            last_request: None,
            crash_count: 0,
            watchdog: None,
            advance_at: None,
            init_waiters: Vec::new(),
            debug_sink: None,
            eval_tx,
            event_tx,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            searching: self.searching,
            crash_count: self.crash_count,
            active_search: self.active.as_ref().map(|a| ActiveSearchInfo {
                id: a.id,
                fen: a.fen.clone(),
            }),
            last_position: self.last_request.as_ref().map(|r| r.fen.clone()),
            staged_request: self.staged.as_ref().map(|s| s.request.clone()),
            queued_commands: self.queue.len(),
        }
    }

    pub fn set_debug_sink(&mut self, sink: Option<DebugSink>) {
        self.debug_sink = sink;
    }

    pub async fn next_channel_event(&mut self) -> Option<ChannelEvent> {
        match self.channel.as_mut() {
            Some(live) => live.events.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog
    }

    pub fn advance_deadline(&self) -> Option<Instant> {
        self.advance_at
    }

    // ---- lifecycle ----

    /// Join or start a handshake. After the session gave up, this re-arms the
    /// whole retry budget.
    pub fn init(&mut self, reply: oneshot::Sender<Result<(), SessionError>>) {
        if self.channel.is_some() && self.phase == LifecyclePhase::Ready {
            let _ = reply.send(Ok(()));
            return;
        }

        self.init_waiters.push(reply);
        if self.channel.is_none() {
            self.reset_after_give_up();
            if let Err(err) = self.start_handshake() {
                tracing::error!("Engine init failed: {}", err);
                self.fail_init_waiters(&err);
            }
        }
    }

    /// A caller asking again after the session gave up gets a fresh retry budget.
    fn reset_after_give_up(&mut self) {
        if self.phase == LifecyclePhase::Terminated {
            self.crash_count = 0;
        }
    }

    fn start_handshake(&mut self) -> Result<(), SessionError> {
        let SpawnedChannel { channel, events } = self.spawner.spawn(&self.target)?;
        tracing::info!(crash_count = self.crash_count, "Engine channel created, starting handshake");

        self.channel = Some(LiveChannel { channel, events });
        self.phase = LifecyclePhase::Handshaking;
        self.watchdog = Some(Instant::now() + self.timing.handshake_timeout);

        self.send("uci", Some(Completion::Handshake), None);
        self.send(&set_option_command("Threads", self.config.threads), None, None);
        self.send(&set_option_command("Hash", self.config.hash_mb), None, None);
        Ok(())
    }

    fn on_uci_ok(&mut self) {
        if self.phase == LifecyclePhase::Handshaking {
            tracing::debug!("Received uciok, waiting for readyok");
            self.watchdog = Some(Instant::now() + self.timing.ready_watchdog);
        }
    }

    fn on_ready_ok(&mut self) {
        self.crash_count = 0;
        self.watchdog = None;
        if self.phase != LifecyclePhase::Ready {
            tracing::info!("Engine ready");
            self.phase = LifecyclePhase::Ready;
            let _ = self.event_tx.send(SessionEvent::Ready);
        }
        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        self.advance();
    }

    pub fn on_watchdog_fired(&mut self) {
        self.watchdog = None;
        if self.channel.is_none() || self.phase == LifecyclePhase::Ready {
            return;
        }
        tracing::warn!("Engine handshake stalled");
        self.handle_failure(Failure::HandshakeStalled);
    }

    pub fn on_channel_event(&mut self, event: Option<ChannelEvent>) {
        match event {
            Some(ChannelEvent::Message(payload)) => self.handle_payload(&payload),
            Some(ChannelEvent::Error(reason)) => {
                tracing::error!("Engine channel error: {}", reason);
                self.handle_failure(Failure::ChannelFault(reason));
            }
            Some(ChannelEvent::MessageError(reason)) => {
                tracing::error!("Engine message error: {}", reason);
                self.handle_failure(Failure::ChannelFault(format!("malformed message: {}", reason)));
            }
            None => {
                tracing::error!("Engine channel closed");
                self.handle_failure(Failure::ChannelFault("channel closed".to_string()));
            }
        }
    }

    fn handle_failure(&mut self, failure: Failure) {
        self.crash_count += 1;
        let reason = match &failure {
            Failure::HandshakeStalled => "handshake stalled".to_string(),
            Failure::ChannelFault(reason) => reason.clone(),
        };
        tracing::warn!(crash_count = self.crash_count, "Engine failure: {}", reason);

        let orphans = self.teardown_channel(&SessionError::ChannelFault(reason.clone()));
        self.phase = LifecyclePhase::Crashed;
        let _ = self.event_tx.send(SessionEvent::Crashed {
            count: self.crash_count,
            reason: reason.clone(),
        });

        if self.crash_count >= self.timing.max_consecutive_failures {
            let err = match failure {
                Failure::HandshakeStalled => SessionError::InitializationTimeout {
                    attempts: self.crash_count,
                },
                Failure::ChannelFault(reason) => SessionError::ChannelFault(reason),
            };
            self.give_up(err, orphans);
            return;
        }

        self.resume(orphans);
    }

    /// Restage the newest known request and restart the engine for it.
    fn resume(&mut self, orphans: Vec<EvalWaiter>) {
        if self.staged.is_none() {
            if let Some(request) = self.last_request.clone() {
                self.staged = Some(StagedSearch {
                    request,
                    waiters: Vec::new(),
                });
            }
        }

        match self.staged.as_mut() {
            Some(staged) => staged.waiters.extend(orphans),
            None => {
                for waiter in orphans {
                    let _ = waiter.send(Err(SessionError::NoEvaluation));
                }
                if self.init_waiters.is_empty() {
                    tracing::info!("Nothing to resume, engine left stopped");
                    return;
                }
            }
        }

        tracing::info!("Restarting engine");
        self.restart();
    }

    fn restart(&mut self) {
        loop {
            match self.start_handshake() {
                Ok(()) => return,
                Err(err) => {
                    self.crash_count += 1;
                    tracing::warn!(crash_count = self.crash_count, "Engine restart failed: {}", err);
                    if self.crash_count >= self.timing.max_consecutive_failures {
                        self.give_up(err, Vec::new());
                        return;
                    }
                }
            }
        }
    }

    fn give_up(&mut self, err: SessionError, orphans: Vec<EvalWaiter>) {
        tracing::error!(
            "Engine failed {} times consecutively, giving up: {}",
            self.crash_count,
            err
        );
        self.phase = LifecyclePhase::Terminated;
        self.fail_init_waiters(&err);
        self.fail_search_waiters(&err, orphans);
        let _ = self.event_tx.send(SessionEvent::Fatal(err));
    }

    /// Kill the channel and forget everything tied to it.
    ///
    /// Returns the waiters of the search that was in flight.
    fn teardown_channel(&mut self, err: &SessionError) -> Vec<EvalWaiter> {
        if let Some(mut live) = self.channel.take() {
            live.channel.terminate();
        }
        self.watchdog = None;
        self.advance_at = None;
        self.searching = false;

        for command in self.queue.drain() {
            if let Some(Completion::Reply(reply)) = command.on_complete {
                let _ = reply.send(Err(err.clone()));
            }
        }

        self.active
            .take()
            .map(|active| active.waiters)
            .unwrap_or_default()
    }

    pub fn destroy(&mut self) {
        tracing::info!("Destroying engine session");
        let orphans = self.teardown_channel(&SessionError::Destroyed);
        self.fail_init_waiters(&SessionError::Destroyed);
        self.fail_search_waiters(&SessionError::Destroyed, orphans);
        self.last_request = None;
        self.crash_count = 0;
        self.phase = LifecyclePhase::Terminated;
        self.eval_tx.send_replace(Evaluation::default());
    }

    fn fail_init_waiters(&mut self, err: &SessionError) {
        for waiter in self.init_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    fn fail_search_waiters(&mut self, err: &SessionError, orphans: Vec<EvalWaiter>) {
        let staged = self.staged.take().map(|s| s.waiters).unwrap_or_default();
        for waiter in orphans.into_iter().chain(staged) {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    // ---- command correlation ----

    /// Send a command, queueing it for correlation unless it expects no reply.
    pub fn send(
        &mut self,
        text: &str,
        on_complete: Option<Completion>,
        on_line: Option<mpsc::UnboundedSender<String>>,
    ) {
        let text = text.trim();
        if self.channel.is_none() {
            tracing::debug!("No engine channel, dropping command: {}", text);
            if let Some(Completion::Reply(reply)) = on_complete {
                let _ = reply.send(Err(SessionError::NotInitialized));
            }
            return;
        }

        let no_reply = is_no_reply(text);
        let immediate = if no_reply {
            on_complete
        } else {
            self.queue.push(text.to_string(), on_complete, on_line);
            None
        };

        if let Some(live) = self.channel.as_mut() {
            tracing::trace!("UCI >> {}", text);
            if let Err(e) = live.channel.post(text) {
                tracing::warn!("Failed to post {:?} to engine: {}", text, e);
            }
        }

        if let Some(completion) = immediate {
            self.run_completion(completion, String::new(), Terminal::Reply);
        }
    }

    fn handle_payload(&mut self, payload: &str) {
        for line in payload.split('\n') {
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.handle_line(line);
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        tracing::trace!("UCI << {}", line);
        if let Some(sink) = &self.debug_sink {
            sink(line);
        }

        if line.starts_with("info depth") {
            self.apply_progress(line);
        }
        if line == "uciok" {
            self.on_uci_ok();
        }
        if line == "readyok" {
            self.on_ready_ok();
        }

        match self.queue.route(line) {
            Routed::Completed { command, terminal } => self.complete(command, terminal),
            Routed::Swallowed | Routed::Dropped | Routed::Pending => {}
        }
    }

    fn complete(&mut self, command: QueuedCommand, terminal: Terminal) {
        if terminal == Terminal::BestMove {
            tracing::debug!("Search ended, scheduling next search");
            self.searching = false;
            self.advance_at = Some(Instant::now() + self.timing.advance_delay);
        }

        if command.discard {
            tracing::debug!("Discarding reply to {:?}", command.text);
            return;
        }
        if let Some(completion) = command.on_complete {
            self.run_completion(completion, command.message, terminal);
        }
    }

    fn run_completion(&mut self, completion: Completion, message: String, terminal: Terminal) {
        match completion {
            Completion::Handshake => self.send("isready", None, None),
            Completion::Reply(reply) => {
                let result = match message.lines().last() {
                    Some(last) if last.starts_with("Unknown command") => {
                        Err(SessionError::Protocol(last.to_string()))
                    }
                    _ => Ok(message),
                };
                let _ = reply.send(result);
            }
            Completion::Search { id } => {
                let (best_move, ponder) = match parse_best_move(&message) {
                    Some((mv, ponder)) if terminal == Terminal::BestMove => (Some(mv), ponder),
                    _ => (None, None),
                };
                tracing::info!(id, "Search finished: {:?}", best_move);
                let _ = self.event_tx.send(SessionEvent::SearchFinished {
                    id,
                    best_move,
                    ponder,
                });
            }
        }
    }

    // ---- search scheduling ----

    /// Stage a search, replacing any request not yet dispatched.
    pub fn request_search(&mut self, request: SearchRequest, waiter: Option<EvalWaiter>) {
        let mut waiters = self.staged.take().map(|s| s.waiters).unwrap_or_default();
        waiters.extend(waiter);
        tracing::debug!("Staging search for {}", request.fen);
        self.staged = Some(StagedSearch { request, waiters });

        if self.channel.is_none() {
            self.reset_after_give_up();
            if let Err(err) = self.start_handshake() {
                tracing::error!("Engine start failed: {}", err);
                self.fail_search_waiters(&err, Vec::new());
            }
            return;
        }

        if self.searching {
            self.request_stop(true);
        } else if self.active.is_none() {
            self.advance();
        }
    }

    /// Ask the active search to end, at most once per search.
    fn request_stop(&mut self, superseded: bool) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if superseded {
            let id = active.id;
            self.queue.mark_discard(
                |cmd| matches!(cmd.on_complete, Some(Completion::Search { id: queued }) if queued == id),
            );
        }
        if active.stop_sent {
            return;
        }
        active.stop_sent = true;
        self.send("stop", None, None);
    }

    /// Forward a stop unconditionally.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.stop_sent = true;
        }
        self.send("stop", None, None);
    }

    /// Dispatch the staged request if the engine is free.
    fn advance(&mut self) {
        if self.channel.is_none()
            || self.phase != LifecyclePhase::Ready
            || self.searching
            || self.active.is_some()
        {
            return;
        }
        let Some(StagedSearch { request, waiters }) = self.staged.take() else {
            return;
        };

        self.next_search_id += 1;
        let id = self.next_search_id;
        tracing::info!(id, fen = %request.fen, "Starting search");

        self.active = Some(ActiveSearch {
            id,
            fen: request.fen.clone(),
            stop_sent: false,
            waiters,
        });
        self.searching = true;
        self.eval_tx.send_replace(Evaluation::default());
        let _ = self.event_tx.send(SessionEvent::SearchStarted {
            id,
            fen: request.fen.clone(),
        });

        self.send("ucinewgame", None, None);
        self.send(&position_command(&request.fen), None, None);
        self.send(&set_option_command("MultiPV", request.multipv), None, None);
        self.send(
            &go_command(request.infinite),
            Some(Completion::Search { id }),
            None,
        );
        self.last_request = Some(request);
    }

    pub fn on_advance_due(&mut self) {
        self.advance_at = None;
        if let Some(active) = self.active.take() {
            match self.staged.as_mut() {
                Some(staged) => staged.waiters.extend(active.waiters),
                None => {
                    for waiter in active.waiters {
                        let _ = waiter.send(Err(SessionError::NoEvaluation));
                    }
                }
            }
        }
        self.advance();
    }

    // ---- progress ----

    fn apply_progress(&mut self, line: &str) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(progress) = parse_progress_line(line) else {
            return;
        };

        let depth = progress.depth;
        self.eval_tx.send_modify(|eval| eval.record(progress));
        if depth > 0 {
            for waiter in active.waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
        }

        if depth >= self.config.max_depth && !active.stop_sent {
            tracing::info!("Max depth {} reached, stopping", self.config.max_depth);
            active.stop_sent = true;
            self.send("stop", None, None);
        }
    }
}
