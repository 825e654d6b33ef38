//! Configuration for an engine session.
//!
//! [`SessionConfig`] holds the engine tunables callers may change at any time;
//! [`Timing`] holds the deadlines and retry budget of the session actor. Every
//! value has a compile-time default, and the `get_*` helpers let an environment
//! variable override it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default depth at which a search is stopped.
const DEFAULT_MAX_DEPTH: u32 = 25;

/// Default number of principal variations requested.
const DEFAULT_MULTIPV: u32 = 3;

/// Default engine thread count, sent during the handshake.
const DEFAULT_THREADS: u32 = 1;

/// Default transposition table size in MB, sent during the handshake.
const DEFAULT_HASH_MB: u32 = 16;

/// Default bound on waiting for the first progress line of a search.
const DEFAULT_EVAL_TIMEOUT_MS: u64 = 2000;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READY_WATCHDOG: Duration = Duration::from_millis(250);
const DEFAULT_ADVANCE_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Engine tunables.
///
/// `threads` and `hash_mb` are only sent during the handshake, so changing them
/// takes effect on the next (re)start. `max_depth` is read on every progress
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_depth: u32,
    pub multipv: u32,
    pub threads: u32,
    pub hash_mb: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            multipv: DEFAULT_MULTIPV,
            threads: DEFAULT_THREADS,
            hash_mb: DEFAULT_HASH_MB,
        }
    }
}

impl SessionConfig {
    /// Build a config from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            max_depth: get_max_depth(),
            multipv: get_multipv(),
            threads: get_threads(),
            hash_mb: get_hash_mb(),
        }
    }
}

/// Deadlines and retry budget of the session actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Time allowed from channel creation to "uciok".
    pub handshake_timeout: Duration,
    /// Time allowed from "uciok" to "readyok".
    pub ready_watchdog: Duration,
    /// Pause between a "bestmove" and dispatching the next staged search.
    pub advance_delay: Duration,
    /// Bound on waiting for a requested search to report progress.
    pub eval_start_timeout: Duration,
    /// Consecutive stalls or crashes tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            ready_watchdog: DEFAULT_READY_WATCHDOG,
            advance_delay: DEFAULT_ADVANCE_DELAY,
            eval_start_timeout: Duration::from_millis(DEFAULT_EVAL_TIMEOUT_MS),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl Timing {
    /// Defaults, with the evaluation wait taken from the environment.
    pub fn from_env() -> Self {
        Self {
            eval_start_timeout: Duration::from_millis(get_eval_timeout_ms()),
            ..Self::default()
        }
    }
}

/// Get the depth at which searches are stopped.
///
/// Priority:
/// 1. `UCI_SESSION_MAX_DEPTH` env variable if set and parseable
/// 2. `25` as fallback
pub fn get_max_depth() -> u32 {
    env_or("UCI_SESSION_MAX_DEPTH", DEFAULT_MAX_DEPTH)
}

/// Get the default MultiPV count (`UCI_SESSION_MULTIPV`, else `3`).
pub fn get_multipv() -> u32 {
    env_or("UCI_SESSION_MULTIPV", DEFAULT_MULTIPV)
}

/// Get the engine thread count (`UCI_SESSION_THREADS`, else `1`).
pub fn get_threads() -> u32 {
    env_or("UCI_SESSION_THREADS", DEFAULT_THREADS)
}

/// Get the hash size in MB (`UCI_SESSION_HASH_MB`, else `16`).
pub fn get_hash_mb() -> u32 {
    env_or("UCI_SESSION_HASH_MB", DEFAULT_HASH_MB)
}

/// Get the evaluation wait in milliseconds (`UCI_SESSION_EVAL_TIMEOUT_MS`, else `2000`).
pub fn get_eval_timeout_ms() -> u64 {
    env_or("UCI_SESSION_EVAL_TIMEOUT_MS", DEFAULT_EVAL_TIMEOUT_MS)
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    if let Ok(value) = std::env::var(key) {
        return value.parse().unwrap_or(default);
    }

    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.max_depth, 25);
        assert_eq!(config.multipv, 3);
        assert_eq!(config.threads, 1);
        assert_eq!(config.hash_mb, 16);
    }

    #[test]
    fn test_get_max_depth() {
        let depth = get_max_depth();
        match std::env::var("UCI_SESSION_MAX_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            Some(val) => assert_eq!(depth, val),
            None => assert_eq!(depth, DEFAULT_MAX_DEPTH),
        }
    }

    #[test]
    fn test_env_or_unset_key() {
        // Uses a key no one sets, so the default must come back.
        assert_eq!(env_or("UCI_SESSION_TEST_UNSET_KEY", 7u32), 7);
    }

    #[test]
    fn test_default_timing() {
        let timing = Timing::default();
        assert_eq!(timing.ready_watchdog, Duration::from_millis(250));
        assert_eq!(timing.advance_delay, Duration::from_millis(10));
        assert_eq!(timing.eval_start_timeout, Duration::from_millis(2000));
        assert_eq!(timing.max_consecutive_failures, 10);
    }
}
