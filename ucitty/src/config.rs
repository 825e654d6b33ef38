//! Runtime tunables for the CLI.
//!
//! Each value can be set by an environment variable; command-line flags win
//! over both the variable and the default.

use std::path::PathBuf;

/// Engine binary used when nothing else is configured.
const DEFAULT_ENGINE: &str = "stockfish";

/// Get the engine binary to run.
///
/// Priority:
/// 1. `UCITTY_ENGINE` env variable if set and non-empty
/// 2. `stockfish` as fallback (looked up in the usual install locations)
pub fn get_engine() -> String {
    if let Ok(engine) = std::env::var("UCITTY_ENGINE") {
        if !engine.trim().is_empty() {
            return engine;
        }
    }

    DEFAULT_ENGINE.to_string()
}

/// Get the directory for log files.
///
/// Returns `None` unless `UCITTY_LOG_DIR` is set, in which case logs go to a
/// daily-rolling file there instead of stderr.
pub fn get_log_dir() -> Option<PathBuf> {
    std::env::var_os("UCITTY_LOG_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_engine() {
        let engine = get_engine();
        match std::env::var("UCITTY_ENGINE") {
            Ok(val) if !val.trim().is_empty() => assert_eq!(engine, val),
            _ => assert_eq!(engine, DEFAULT_ENGINE),
        }
    }

    #[test]
    fn test_get_log_dir() {
        let dir = get_log_dir();
        match std::env::var_os("UCITTY_LOG_DIR") {
            Some(val) if !val.is_empty() => assert_eq!(dir, Some(PathBuf::from(val))),
            _ => assert_eq!(dir, None),
        }
    }
}
