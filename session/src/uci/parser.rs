use serde::{Deserialize, Serialize};

/// Highest multipv rank accepted. Stockfish caps the MultiPV option here.
pub const MAX_MULTIPV: u32 = 256;

/// Evaluation reported for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}

/// One ranked principal variation of the current search.
///
/// Exactly one of `score` and `mate` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineLine {
    pub score: Option<i32>,
    pub mate: Option<i32>,
    pub best_move: String,
    pub line: Vec<String>,
    /// The score is a bound, not exact.
    pub cutoff: bool,
}

impl EngineLine {
    pub fn new(score: Score, line: Vec<String>, cutoff: bool) -> Self {
        let (score, mate) = match score {
            Score::Centipawns(cp) => (Some(cp), None),
            Score::Mate(m) => (None, Some(m)),
        };
        Self {
            score,
            mate,
            best_move: line.first().cloned().unwrap_or_default(),
            line,
            cutoff,
        }
    }

    pub fn score(&self) -> Score {
        match (self.score, self.mate) {
            (_, Some(m)) => Score::Mate(m),
            (Some(cp), None) => Score::Centipawns(cp),
            (None, None) => Score::Centipawns(0),
        }
    }
}

/// A parsed "info depth ..." progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub depth: u32,
    /// 1-based rank of this line among the requested variations.
    pub multipv: u32,
    pub line: EngineLine,
}

/// Parse a progress line.
///
/// Returns `None` unless the line carries `depth`, `multipv`, `score` and `pv`
/// with readable values. Lines without `multipv` (single-PV engines that omit
/// it) are ignored as well, and so are ranks above [`MAX_MULTIPV`].
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"info") {
        return None;
    }

    let mut depth = None;
    let mut multipv = None;
    let mut score = None;
    let mut pv: Option<Vec<String>> = None;
    let mut cutoff = false;
    let mut i = 1;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "lowerbound" | "upperbound" => cutoff = true,
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                let mut moves = Vec::new();
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    moves.push(tokens[i].to_string());
                    i += 1;
                }
                pv = Some(moves);
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    let multipv = multipv.filter(|&rank| (1..=MAX_MULTIPV).contains(&rank))?;
    let pv = pv.filter(|moves| !moves.is_empty())?;
    Some(ProgressLine {
        depth: depth?,
        multipv,
        line: EngineLine::new(score?, pv, cutoff),
    })
}

/// Split a "bestmove" line into the move and the optional ponder move.
pub fn parse_best_move(line: &str) -> Option<(String, Option<String>)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"bestmove") {
        return None;
    }
    let mv = tokens.get(1)?.to_string();
    let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
        Some(tokens[3].to_string())
    } else {
        None
    };
    Some((mv, ponder))
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
            | "refutation"
            | "currline"
            | "wdl"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_progress_line() {
        let parsed = parse_progress_line("info depth 12 score cp 34 multipv 1 pv e2e4 e7e5").unwrap();
        assert_eq!(parsed.depth, 12);
        assert_eq!(parsed.multipv, 1);
        assert_eq!(
            parsed.line,
            EngineLine {
                score: Some(34),
                mate: None,
                best_move: "e2e4".to_string(),
                line: vec!["e2e4".to_string(), "e7e5".to_string()],
                cutoff: false,
            }
        );
    }

    #[test]
    fn test_parse_stockfish_line() {
        let line = "info depth 18 seldepth 24 multipv 2 score cp -15 nodes 1523401 nps 1200000 \
                    hashfull 312 tbhits 0 time 1269 pv d2d4 d7d5 c2c4";
        let parsed = parse_progress_line(line).unwrap();
        assert_eq!(parsed.depth, 18);
        assert_eq!(parsed.multipv, 2);
        assert_eq!(parsed.line.score(), Score::Centipawns(-15));
        assert_eq!(parsed.line.best_move, "d2d4");
        assert_eq!(parsed.line.line.len(), 3);
    }

    #[test]
    fn test_parse_mate_score() {
        let parsed =
            parse_progress_line("info depth 5 multipv 1 score mate -3 nodes 900 pv h5f7 e8e7")
                .unwrap();
        assert_eq!(parsed.line.mate, Some(-3));
        assert_eq!(parsed.line.score, None);
    }

    #[test]
    fn test_parse_bound_marks_cutoff() {
        let parsed = parse_progress_line(
            "info depth 20 seldepth 28 multipv 1 score cp 41 lowerbound nodes 10 pv g1f3",
        )
        .unwrap();
        assert!(parsed.line.cutoff);
    }

    #[test]
    fn test_missing_tokens_are_ignored() {
        assert!(parse_progress_line("info depth 12 score cp 34 pv e2e4").is_none());
        assert!(parse_progress_line("info depth 12 multipv 1 pv e2e4").is_none());
        assert!(parse_progress_line("info depth 12 multipv 1 score cp 20").is_none());
        assert!(parse_progress_line("info depth 3 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_progress_line("info depth 4 multipv 0 score cp 1 pv e2e4").is_none());
    }

    #[test]
    fn test_out_of_range_multipv_is_ignored() {
        assert!(parse_progress_line("info depth 3 multipv 4000000000 score cp 1 pv e2e4").is_none());
        assert!(parse_progress_line("info depth 3 multipv 257 score cp 1 pv e2e4").is_none());
        let top = parse_progress_line("info depth 3 multipv 256 score cp 1 pv e2e4").unwrap();
        assert_eq!(top.multipv, MAX_MULTIPV);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_best_move("bestmove e2e4 ponder e7e5"),
            Some(("e2e4".to_string(), Some("e7e5".to_string())))
        );
        assert_eq!(
            parse_best_move("bestmove (none)"),
            Some(("(none)".to_string(), None))
        );
        assert_eq!(parse_best_move("info depth 1"), None);
    }
}
