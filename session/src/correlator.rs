//! Matching engine output lines to the commands that caused them.
//!
//! Only commands that expect a reply are queued. An incoming line is routed to
//! the first queued command of the same reply family, or to the head of the
//! queue when no family matches. That fallback assumes at most one
//! outstanding command per family; with several unrelated commands queued an
//! unclassifiable line can land on the wrong one.

use tokio::sync::{mpsc, oneshot};

use crate::error::SessionError;
use crate::uci::{first_word, is_banner, is_diagnostic_dump, ReplyKind};

/// Trailers that end the output of `eval`.
const EVALUATION_TRAILERS: [&str; 2] = ["Total Evaluation", "Final evaluation"];

/// What to do once a queued command completes.
#[derive(Debug)]
pub(crate) enum Completion {
    /// The `uci` command of a handshake; `isready` follows.
    Handshake,
    /// Hand the accumulated reply to a caller.
    Reply(oneshot::Sender<Result<String, SessionError>>),
    /// The `go` command of the search with this id.
    Search { id: u64 },
}

#[derive(Debug)]
pub(crate) struct QueuedCommand {
    pub text: String,
    pub on_complete: Option<Completion>,
    pub on_line: Option<mpsc::UnboundedSender<String>>,
    pub message: String,
    pub discard: bool,
}

impl QueuedCommand {
    fn append(&mut self, line: &str) {
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(line);
    }
}

/// Which terminal line ended a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    UciOk,
    ReadyOk,
    BestMove,
    Reply,
}

#[derive(Debug)]
pub(crate) enum Routed {
    /// Banner noise, never matched.
    Swallowed,
    /// Nothing was waiting for a reply.
    Dropped,
    /// Appended to a command that is still waiting.
    Pending,
    Completed {
        command: QueuedCommand,
        terminal: Terminal,
    },
}

#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    entries: Vec<QueuedCommand>,
}

impl CommandQueue {
    pub fn push(
        &mut self,
        text: String,
        on_complete: Option<Completion>,
        on_line: Option<mpsc::UnboundedSender<String>>,
    ) {
        self.entries.push(QueuedCommand {
            text,
            on_complete,
            on_line,
            message: String::new(),
            discard: false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the command a line belongs to.
    pub fn find_index(&self, line: &str) -> Option<usize> {
        let head = self.entries.first()?;
        if is_diagnostic_dump(&head.text) {
            return Some(0);
        }

        let kind = ReplyKind::of_line(line);
        let matched = self
            .entries
            .iter()
            .position(|entry| ReplyKind::of_command(&entry.text) == Some(kind));
        Some(matched.unwrap_or(0))
    }

    /// Route one engine line.
    pub fn route(&mut self, line: &str) -> Routed {
        if is_banner(line) {
            return Routed::Swallowed;
        }
        let Some(index) = self.find_index(line) else {
            return Routed::Dropped;
        };

        let entry = &mut self.entries[index];
        if let Some(stream) = &entry.on_line {
            let _ = stream.send(line.to_string());
        }
        entry.append(line);

        let command = first_word(&entry.text);
        let terminal = if line == "uciok" {
            Some(Terminal::UciOk)
        } else if line == "readyok" {
            Some(Terminal::ReadyOk)
        } else if first_word(line) == "bestmove" && command != "bench" {
            entry.message = line.to_string();
            Some(Terminal::BestMove)
        } else if (command == "d" && line.starts_with("Legal uci moves"))
            || (command == "eval" && has_evaluation_trailer(&entry.message))
            || line.starts_with("Nodes/second")
            || line.starts_with("Unknown command")
        {
            Some(Terminal::Reply)
        } else {
            None
        };

        match terminal {
            Some(terminal) => Routed::Completed {
                command: self.entries.remove(index),
                terminal,
            },
            None => Routed::Pending,
        }
    }

    /// Mark matching commands so their completion is not reported.
    pub fn mark_discard(&mut self, mut matches: impl FnMut(&QueuedCommand) -> bool) {
        for entry in self.entries.iter_mut().filter(|e| matches(e)) {
            entry.discard = true;
        }
    }

    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        std::mem::take(&mut self.entries)
    }
}

fn has_evaluation_trailer(message: &str) -> bool {
    EVALUATION_TRAILERS.iter().any(|marker| {
        message
            .find(marker)
            .is_some_and(|at| !message[at + marker.len()..].trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(commands: &[&str]) -> CommandQueue {
        let mut queue = CommandQueue::default();
        for cmd in commands {
            queue.push(cmd.to_string(), None, None);
        }
        queue
    }

    fn completed(routed: Routed) -> (QueuedCommand, Terminal) {
        match routed {
            Routed::Completed { command, terminal } => (command, terminal),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_queue_drops_lines() {
        let mut queue = CommandQueue::default();
        assert!(matches!(queue.route("readyok"), Routed::Dropped));
    }

    #[test]
    fn test_banner_lines_are_swallowed() {
        let mut queue = queue_of(&["uci"]);
        assert!(matches!(queue.route("id name Stockfish 17"), Routed::Swallowed));
        assert!(matches!(
            queue.route("Stockfish 17 by the Stockfish developers"),
            Routed::Swallowed
        ));
        assert!(matches!(queue.route("No such option: Foo"), Routed::Swallowed));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_uci_reply_accumulates_options() {
        let mut queue = queue_of(&["uci"]);
        assert!(matches!(
            queue.route("option name Threads type spin default 1 min 1 max 1024"),
            Routed::Pending
        ));
        let (cmd, terminal) = completed(queue.route("uciok"));
        assert_eq!(terminal, Terminal::UciOk);
        assert_eq!(
            cmd.message,
            "option name Threads type spin default 1 min 1 max 1024\nuciok"
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lines_match_by_family_not_position() {
        let mut queue = queue_of(&["go infinite", "isready"]);
        let (cmd, terminal) = completed(queue.route("readyok"));
        assert_eq!(cmd.text, "isready");
        assert_eq!(terminal, Terminal::ReadyOk);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_unmatched_family_falls_back_to_head() {
        let queue = queue_of(&["isready", "go depth 20"]);
        assert_eq!(queue.find_index("something unexpected"), Some(0));
        assert_eq!(queue.find_index("info depth 1"), Some(1));
    }

    #[test]
    fn test_bestmove_replaces_accumulated_info() {
        let mut queue = queue_of(&["go depth 20"]);
        assert!(matches!(
            queue.route("info depth 1 multipv 1 score cp 20 pv e2e4"),
            Routed::Pending
        ));
        let (cmd, terminal) = completed(queue.route("bestmove e2e4 ponder e7e5"));
        assert_eq!(terminal, Terminal::BestMove);
        assert_eq!(cmd.message, "bestmove e2e4 ponder e7e5");
    }

    #[test]
    fn test_bench_takes_everything_until_nodes_per_second() {
        let mut queue = queue_of(&["bench", "isready"]);
        assert!(matches!(
            queue.route("info depth 13 multipv 1 score cp 21 pv e2e4"),
            Routed::Pending
        ));
        assert!(matches!(queue.route("bestmove e2e4"), Routed::Pending));
        assert!(matches!(queue.route("Total time (ms) : 1000"), Routed::Pending));
        let (cmd, terminal) = completed(queue.route("Nodes/second    : 1234567"));
        assert_eq!(cmd.text, "bench");
        assert_eq!(terminal, Terminal::Reply);
        assert_eq!(cmd.message.lines().count(), 4);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_d_completes_on_legal_moves() {
        let mut queue = queue_of(&["d"]);
        assert!(matches!(queue.route(" +---+---+"), Routed::Pending));
        assert!(matches!(queue.route("Fen: 8/8/8/8/8/8/8/8 w - - 0 1"), Routed::Pending));
        let (cmd, _) = completed(queue.route("Legal uci moves: e2e4 d2d4"));
        assert_eq!(cmd.message.lines().count(), 3);
    }

    #[test]
    fn test_eval_completes_on_trailer() {
        let mut queue = queue_of(&["eval"]);
        assert!(matches!(queue.route("NNUE evaluation +0.10"), Routed::Pending));
        let (cmd, _) = completed(queue.route("Total Evaluation: 0.12 (white side)"));
        assert!(cmd.message.ends_with("(white side)"));

        let mut queue = queue_of(&["eval"]);
        assert!(matches!(
            queue.route("Final evaluation       +0.12 (white side)"),
            Routed::Completed { .. }
        ));
    }

    #[test]
    fn test_unknown_command_completes() {
        let mut queue = queue_of(&["frobnicate"]);
        let (cmd, terminal) = completed(
            queue.route("Unknown command: 'frobnicate'. Type help for more information."),
        );
        assert_eq!(terminal, Terminal::Reply);
        assert!(cmd.message.starts_with("Unknown command"));
    }

    #[test]
    fn test_stream_sees_every_matched_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queue = CommandQueue::default();
        queue.push("go depth 20".to_string(), None, Some(tx));
        queue.route("info depth 1 multipv 1 score cp 3 pv e2e4");
        queue.route("bestmove e2e4");
        assert_eq!(
            rx.try_recv().unwrap(),
            "info depth 1 multipv 1 score cp 3 pv e2e4"
        );
        assert_eq!(rx.try_recv().unwrap(), "bestmove e2e4");
    }

    #[test]
    fn test_mark_discard() {
        let mut queue = CommandQueue::default();
        queue.push("go infinite".into(), Some(Completion::Search { id: 4 }), None);
        queue.mark_discard(|c| matches!(c.on_complete, Some(Completion::Search { id: 4 })));
        let (cmd, _) = completed(queue.route("bestmove e2e4"));
        assert!(cmd.discard);
    }
}
