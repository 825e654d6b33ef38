use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChannelEvent, ChannelSpawner, SpawnedChannel, WorkerChannel};
use crate::error::ChannelError;

/// Name that triggers a lookup in the usual install locations.
const DEFAULT_ENGINE_NAME: &str = "stockfish";

/// Spawns the engine as a child process talking UCI over stdin/stdout.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpawner {
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra arguments passed to the engine binary.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl ChannelSpawner for ProcessSpawner {
    #[tracing::instrument(level = "info", skip(self))]
    fn spawn(&self, target: &str) -> Result<SpawnedChannel, ChannelError> {
        let path = resolve_engine_path(target)
            .ok_or_else(|| ChannelError::NotFound(target.to_string()))?;
        tracing::info!("Spawning engine at {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                ChannelError::Io(e)
            })?;

        let mut stdin = process.stdin.take().ok_or(ChannelError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(ChannelError::NoStdout)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();

        let reader_tx = event_tx.clone();
        let reader = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Engine stdout EOF - engine closed");
                        let _ = reader_tx.send(ChannelEvent::Error("engine closed stdout".into()));
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end_matches(['\r', '\n']);
                        if reader_tx
                            .send(ChannelEvent::Message(trimmed.to_string()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::InvalidData => {
                        tracing::error!("Undecodable engine output: {}", e);
                        let _ = reader_tx.send(ChannelEvent::MessageError(e.to_string()));
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading from engine stdout: {}", e);
                        let _ = reader_tx.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });

        let writer = tokio::spawn(async move {
            while let Some(cmd) = stdin_rx.recv().await {
                let written = match stdin.write_all(cmd.as_bytes()).await {
                    Ok(()) => stdin.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::error!("Failed to write to engine stdin: {}", e);
                    let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
            }
            tracing::debug!("Stdin writer task exiting");
        });

        Ok(SpawnedChannel {
            channel: Box::new(ProcessChannel {
                process,
                stdin: stdin_tx,
                reader,
                writer,
            }),
            events: event_rx,
        })
    }
}

struct ProcessChannel {
    process: Child,
    stdin: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WorkerChannel for ProcessChannel {
    fn post(&mut self, line: &str) -> Result<(), ChannelError> {
        self.stdin
            .send(format!("{}\n", line))
            .map_err(|_| ChannelError::Closed)
    }

    fn terminate(&mut self) {
        self.reader.abort();
        self.writer.abort();
        if let Err(e) = self.process.start_kill() {
            tracing::debug!("Engine already exited: {}", e);
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Resolve the engine binary for a target.
///
/// An existing path is used as given. The bare name `stockfish` is looked up in
/// common install locations. Anything else is left to `PATH` lookup.
pub fn resolve_engine_path(target: &str) -> Option<PathBuf> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    let path = Path::new(target);
    if path.exists() {
        return Some(path.to_path_buf());
    }

    if target == DEFAULT_ENGINE_NAME {
        let candidates = [
            "/usr/local/bin/stockfish",
            "/usr/bin/stockfish",
            "/opt/homebrew/bin/stockfish",
            "/usr/games/stockfish",
        ];
        if let Some(found) = candidates.iter().map(Path::new).find(|p| p.exists()) {
            return Some(found.to_path_buf());
        }
    }

    // In PATH
    Some(PathBuf::from(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_target() {
        assert_eq!(resolve_engine_path("  "), None);
    }

    #[test]
    fn test_resolve_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("engine");
        std::fs::write(&engine, "").unwrap();
        assert_eq!(
            resolve_engine_path(engine.to_str().unwrap()),
            Some(engine.clone())
        );
    }

    #[test]
    fn test_resolve_falls_back_to_path_lookup() {
        assert_eq!(
            resolve_engine_path("some-engine-name"),
            Some(PathBuf::from("some-engine-name"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_channel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(
            &script,
            "while IFS= read -r line; do\n\
             case \"$line\" in\n\
             uci) echo 'id name ShellFish'; echo 'uciok';;\n\
             isready) echo 'readyok';;\n\
             esac\n\
             done\n",
        )
        .unwrap();

        let spawner = ProcessSpawner::new().with_args([script.to_str().unwrap()]);
        let SpawnedChannel {
            mut channel,
            mut events,
        } = spawner.spawn("sh").unwrap();

        channel.post("uci").unwrap();
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message("id name ShellFish".into()))
        );
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message("uciok".into()))
        );

        channel.post("isready").unwrap();
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message("readyok".into()))
        );

        channel.terminate();
    }
}
