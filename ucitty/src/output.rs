//! Rendering analysis results for the terminal.

use serde::Serialize;
use uci_session::{EngineLine, Evaluation, Score};

/// Analysis of one position, as printed by `analyse --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub fen: String,
    pub depth: u32,
    pub lines: Vec<ReportLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub rank: usize,
    /// Centipawns from the side to move. Absent for mate scores.
    pub score_cp: Option<i32>,
    pub mate: Option<i32>,
    /// The score is only a bound.
    pub bound: bool,
    pub best_move: String,
    pub pv: Vec<String>,
}

impl AnalysisReport {
    /// Ranks that have not reported yet are left out.
    pub fn new(fen: &str, eval: &Evaluation) -> Self {
        let lines = eval
            .lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| line.as_ref().map(|line| ReportLine::new(index + 1, line)))
            .collect();
        Self {
            fen: fen.to_string(),
            depth: eval.depth,
            lines,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_plain(&self) -> String {
        let mut out = format!("{}\ndepth {}\n", self.fen, self.depth);
        if self.lines.is_empty() {
            out.push_str("  (no lines)\n");
        }
        for line in &self.lines {
            out.push_str(&format!(
                "{:>3}. {:>7}  {}\n",
                line.rank,
                line.score_label(),
                line.pv.join(" ")
            ));
        }
        out
    }
}

impl ReportLine {
    fn new(rank: usize, line: &EngineLine) -> Self {
        Self {
            rank,
            score_cp: line.score,
            mate: line.mate,
            bound: line.cutoff,
            best_move: line.best_move.clone(),
            pv: line.line.clone(),
        }
    }

    fn score(&self) -> Score {
        match (self.score_cp, self.mate) {
            (_, Some(m)) => Score::Mate(m),
            (Some(cp), None) => Score::Centipawns(cp),
            (None, None) => Score::Centipawns(0),
        }
    }

    /// `+0.34`, `-1.20`, `#3`, `#-2`; bounds get a trailing `?`.
    pub fn score_label(&self) -> String {
        let label = match self.score() {
            Score::Centipawns(cp) => {
                let sign = if cp < 0 { "-" } else { "+" };
                let abs = cp.unsigned_abs();
                format!("{}{}.{:02}", sign, abs / 100, abs % 100)
            }
            Score::Mate(m) => format!("#{}", m),
        };
        if self.bound {
            format!("{}?", label)
        } else {
            label
        }
    }
}
