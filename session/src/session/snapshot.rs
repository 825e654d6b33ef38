use serde::{Deserialize, Serialize};

use crate::uci::{EngineLine, ProgressLine, MAX_MULTIPV};

/// Progress of the current search.
///
/// `lines` is indexed by multipv rank minus one and may have holes while some
/// ranks have not reported at the current iteration yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub depth: u32,
    pub lines: Vec<Option<EngineLine>>,
}

impl Evaluation {
    /// Line for a 1-based multipv rank.
    pub fn line(&self, rank: usize) -> Option<&EngineLine> {
        rank.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .and_then(Option::as_ref)
    }

    pub fn best(&self) -> Option<&EngineLine> {
        self.line(1)
    }

    /// Ranks outside `1..=MAX_MULTIPV` are dropped.
    pub(crate) fn record(&mut self, progress: ProgressLine) {
        if !(1..=MAX_MULTIPV).contains(&progress.multipv) {
            return;
        }
        self.depth = progress.depth;
        let index = (progress.multipv - 1) as usize;
        if self.lines.len() <= index {
            self.lines.resize(index + 1, None);
        }
        self.lines[index] = Some(progress.line);
    }
}

/// Where the session is in its lifecycle. Searching is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Uninitialized,
    Handshaking,
    Ready,
    Crashed,
    Terminated,
}

/// A search request, staged until the engine is free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub fen: String,
    pub multipv: u32,
    pub infinite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSearchInfo {
    pub id: u64,
    pub fen: String,
}

/// Point-in-time view of the session, for callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub phase: LifecyclePhase,
    pub searching: bool,
    pub crash_count: u32,
    pub active_search: Option<ActiveSearchInfo>,
    pub last_position: Option<String>,
    pub staged_request: Option<SearchRequest>,
    pub queued_commands: usize,
}
