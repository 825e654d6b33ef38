use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::Instrument;

use super::commands::SessionCommand;
use super::state::SessionState;
use crate::correlator::Completion;

/// The main session actor loop.
/// Owns all mutable state. Processes commands, channel events and deadlines sequentially.
pub(crate) async fn run_session_actor(state: SessionState, cmd_rx: mpsc::Receiver<SessionCommand>) {
    let target = state.target().to_string();
    run_session_actor_inner(state, cmd_rx)
        .instrument(tracing::info_span!("engine_session", target = %target))
        .await;
}

async fn run_session_actor_inner(
    mut state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
) {
    tracing::info!("Session actor started");

    loop {
        let watchdog = state.watchdog_deadline();
        let advance = state.advance_deadline();

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => handle_command(&mut state, cmd),
                    None => {
                        tracing::info!("All handles dropped, session actor shutting down");
                        state.destroy();
                        break;
                    }
                }
            }

            event = state.next_channel_event() => {
                state.on_channel_event(event);
            }

            _ = sleep_until_opt(watchdog), if watchdog.is_some() => {
                state.on_watchdog_fired();
            }

            _ = sleep_until_opt(advance), if advance.is_some() => {
                state.on_advance_due();
            }
        }
    }

    tracing::info!("Session actor exited");
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn handle_command(state: &mut SessionState, cmd: SessionCommand) {
    match cmd {
        SessionCommand::Init { reply } => state.init(reply),
        SessionCommand::Evaluate { request, reply } => state.request_search(request, Some(reply)),
        SessionCommand::Stop { reply } => {
            state.stop();
            let _ = reply.send(());
        }
        SessionCommand::Destroy { reply } => {
            state.destroy();
            let _ = reply.send(());
        }
        SessionCommand::Raw {
            text,
            on_line,
            reply,
        } => {
            tracing::debug!("Raw command: {}", text);
            state.send(&text, Some(Completion::Reply(reply)), on_line);
        }
        SessionCommand::SetDebugStream { sink, reply } => {
            state.set_debug_sink(sink);
            let _ = reply.send(());
        }
        SessionCommand::GetConfig { reply } => {
            let _ = reply.send(state.config);
        }
        SessionCommand::UpdateConfig { update, reply } => {
            update(&mut state.config);
            tracing::debug!(config = ?state.config, "Session config updated");
            let _ = reply.send(state.config);
        }
        SessionCommand::GetStatus { reply } => {
            let _ = reply.send(state.status());
        }
    }
}
