pub mod parser;

pub use parser::{
    parse_best_move, parse_progress_line, EngineLine, ProgressLine, Score, MAX_MULTIPV,
};

/// Commands the engine never answers.
const NO_REPLY_COMMANDS: [&str; 4] = ["ucinewgame", "flip", "stop", "ponderhit"];

/// Line prefixes that are handshake noise rather than a reply to a command.
const BANNER_PREFIXES: [&str; 3] = ["No such option", "id ", "Stockfish"];

/// Depth used for non-infinite searches. Not derived from `max_depth`.
pub const FIXED_SEARCH_DEPTH: u32 = 20;

/// First whitespace-delimited token of a line.
pub fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// True for commands that are sent without expecting any reply.
pub fn is_no_reply(command: &str) -> bool {
    NO_REPLY_COMMANDS.contains(&command)
        || command.starts_with("position")
        || command.starts_with("setoption")
}

/// True for engine banner lines that must not be matched against the queue.
pub fn is_banner(line: &str) -> bool {
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// Commands whose multi-line output carries no correlation marker.
pub fn is_diagnostic_dump(command: &str) -> bool {
    matches!(first_word(command), "bench" | "perft")
}

/// Reply family a line belongs to, and the command family that expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Uci,
    IsReady,
    Go,
    Other,
}

impl ReplyKind {
    /// Classify an engine output line by its first token.
    pub fn of_line(line: &str) -> Self {
        match first_word(line) {
            "uciok" | "option" => ReplyKind::Uci,
            "readyok" => ReplyKind::IsReady,
            "bestmove" | "info" => ReplyKind::Go,
            _ => ReplyKind::Other,
        }
    }

    /// The reply family a queued command waits for, if it is one we can match.
    pub fn of_command(command: &str) -> Option<Self> {
        match first_word(command) {
            "uci" => Some(ReplyKind::Uci),
            "isready" => Some(ReplyKind::IsReady),
            "go" => Some(ReplyKind::Go),
            "d" | "eval" => Some(ReplyKind::Other),
            _ => None,
        }
    }
}

pub fn position_command(fen: &str) -> String {
    format!("position fen {}", fen)
}

pub fn set_option_command(name: &str, value: impl std::fmt::Display) -> String {
    format!("setoption name {} value {}", name, value)
}

pub fn go_command(infinite: bool) -> String {
    if infinite {
        "go infinite".to_string()
    } else {
        format!("go depth {}", FIXED_SEARCH_DEPTH)
    }
}
