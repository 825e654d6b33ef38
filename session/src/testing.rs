//! In-memory engine channels for tests.
//!
//! Only compiled in test mode or with the `mock` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, ChannelSpawner, SpawnedChannel, WorkerChannel};
use crate::error::ChannelError;

/// Scripted engine: maps one posted line to the payloads sent back.
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

type ResponderFactory = Arc<dyn Fn() -> Responder + Send + Sync>;

#[derive(Default)]
struct MockState {
    channels: Vec<MockChannelHandle>,
    failing_spawns: u32,
}

/// Spawner that records every channel it creates.
#[derive(Clone, Default)]
pub struct MockSpawner {
    state: Arc<Mutex<MockState>>,
    responder: Option<ResponderFactory>,
}

impl MockSpawner {
    /// Channels that never answer on their own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give every new channel a fresh responder from `factory`.
    pub fn with_responder<F>(factory: F) -> Self
    where
        F: Fn() -> Responder + Send + Sync + 'static,
    {
        Self {
            state: Arc::default(),
            responder: Some(Arc::new(factory)),
        }
    }

    /// Channels that behave like a well-mannered Stockfish.
    pub fn stockfish_like() -> Self {
        Self::with_responder(stockfish_responder)
    }

    /// Channels that answer "uci" but never "isready".
    pub fn stalling() -> Self {
        Self::with_responder(stalling_responder)
    }

    /// Make the next `count` spawns fail.
    pub fn fail_next_spawns(&self, count: u32) {
        self.state.lock().unwrap().failing_spawns = count;
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<MockChannelHandle> {
        self.state.lock().unwrap().channels.get(index).cloned()
    }

    pub fn last_channel(&self) -> Option<MockChannelHandle> {
        self.state.lock().unwrap().channels.last().cloned()
    }
}

impl ChannelSpawner for MockSpawner {
    fn spawn(&self, target: &str) -> Result<SpawnedChannel, ChannelError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_spawns > 0 {
            state.failing_spawns -= 1;
            return Err(ChannelError::NotFound(target.to_string()));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let handle = MockChannelHandle {
            sent: Arc::default(),
            events: events_tx,
            terminated: Arc::default(),
        };
        state.channels.push(handle.clone());

        Ok(SpawnedChannel {
            channel: Box::new(MockChannel {
                handle,
                responder: self.responder.as_ref().map(|factory| factory()),
            }),
            events,
        })
    }
}

struct MockChannel {
    handle: MockChannelHandle,
    responder: Option<Responder>,
}

impl WorkerChannel for MockChannel {
    fn post(&mut self, line: &str) -> Result<(), ChannelError> {
        if self.handle.is_terminated() {
            return Err(ChannelError::Closed);
        }
        self.handle.sent.lock().unwrap().push(line.to_string());
        if let Some(responder) = self.responder.as_mut() {
            for payload in responder(line) {
                self.handle.emit(&payload);
            }
        }
        Ok(())
    }

    fn terminate(&mut self) {
        self.handle.terminated.store(true, Ordering::SeqCst);
    }
}

/// Test-side view of one mock channel.
#[derive(Clone)]
pub struct MockChannelHandle {
    sent: Arc<Mutex<Vec<String>>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    terminated: Arc<AtomicBool>,
}

impl MockChannelHandle {
    /// Every line posted so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_sent(&self, line: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|l| *l == line).count()
    }

    /// Deliver engine output. Ignored once the channel is terminated.
    pub fn emit(&self, payload: &str) {
        if !self.is_terminated() {
            let _ = self
                .events
                .send(ChannelEvent::Message(payload.to_string()));
        }
    }

    /// Report a transport failure.
    pub fn fail(&self, reason: &str) {
        if !self.is_terminated() {
            let _ = self.events.send(ChannelEvent::Error(reason.to_string()));
        }
    }

    /// Report undecodable output.
    pub fn malformed(&self, reason: &str) {
        if !self.is_terminated() {
            let _ = self
                .events
                .send(ChannelEvent::MessageError(reason.to_string()));
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Answers "uci" but never "isready".
pub fn stalling_responder() -> Responder {
    Box::new(|line: &str| match line {
        "uci" => vec!["id name MockFish\nuciok".to_string()],
        _ => Vec::new(),
    })
}

/// Stateful responder answering like a real engine.
pub fn stockfish_responder() -> Responder {
    let mut multipv = 1u32;
    let mut searching = false;

    Box::new(move |line: &str| {
        let mut words = line.split_whitespace();
        match words.next().unwrap_or("") {
            "uci" => vec![[
                "id name MockFish 17",
                "id author the MockFish developers",
                "",
                "option name Threads type spin default 1 min 1 max 1024",
                "option name Hash type spin default 16 min 1 max 33554432",
                "option name MultiPV type spin default 1 min 1 max 256",
                "uciok",
            ]
            .join("\n")],
            "isready" => vec!["readyok".to_string()],
            "setoption" => {
                if let Some(value) = line.strip_prefix("setoption name MultiPV value ") {
                    multipv = value.trim().parse().unwrap_or(1);
                }
                Vec::new()
            }
            "go" => {
                searching = true;
                let lines: Vec<String> = (1..=multipv)
                    .map(|rank| {
                        format!(
                            "info depth 1 seldepth 1 multipv {} score cp {} nodes 20 nps 20000 pv e2e4 e7e5",
                            rank,
                            30 - 10 * rank as i32
                        )
                    })
                    .collect();
                vec![lines.join("\n")]
            }
            "stop" if searching => {
                searching = false;
                vec!["bestmove e2e4 ponder e7e5".to_string()]
            }
            "d" => vec![[
                " +---+---+---+---+---+---+---+---+",
                " | r | n | b | q | k | b | n | r | 8",
                " +---+---+---+---+---+---+---+---+",
                "   a   b   c   d   e   f   g   h",
                "",
                "Fen: rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
                "Key: 8F8F01D4562F59FB",
                "Checkers: ",
                "Legal uci moves: a2a3 b2b3 e2e4 d2d4",
            ]
            .join("\n")],
            "eval" => vec![[
                "NNUE evaluation        +0.08 (white side)",
                "Final evaluation       +0.12 (white side)",
            ]
            .join("\n")],
            "bench" => vec![[
                "info depth 1 seldepth 1 multipv 1 score cp 20 nodes 20 pv e2e4",
                "bestmove e2e4",
                "===========================",
                "Total time (ms) : 5",
                "Nodes searched  : 1000",
                "Nodes/second    : 200000",
            ]
            .join("\n")],
            "stop" | "ucinewgame" | "position" | "flip" | "ponderhit" => Vec::new(),
            _ => vec![format!(
                "Unknown command: '{}'. Type help for more information.",
                line
            )],
        }
    })
}
