//! Stream relay
//!
//! Each persistent connection runs one [`drive_connection`] loop. Messages are
//! served strictly one at a time: while a turn is streaming, later messages
//! wait in a bounded FIFO queue. Closing the connection aborts the running
//! turn, which drops its upstream stream.

mod prompt;
mod state;
mod turn;

pub use prompt::compose_prompt;
pub use state::{ConnectionPhase, ConnectionState, correlate};
pub use turn::{TurnOutcome, run_turn};

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::error::ClientDisconnect;
use crate::generation::GenerationClient;

/// Outbound half of a persistent connection
#[async_trait]
pub trait FragmentSink: Send {
    /// Deliver one fragment as one text frame
    async fn send_fragment(&mut self, text: String) -> Result<(), ClientDisconnect>;
}

/// Events read from the inbound half of a persistent connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
}

/// Serve one connection until the client leaves
///
/// Returns the final connection state, always in [`ConnectionPhase::Closed`]
/// with no generation in flight.
pub async fn drive_connection<R, S>(
    mut inbound: R,
    sink: Arc<Mutex<S>>,
    generator: Arc<dyn GenerationClient>,
    mut state: ConnectionState,
    config: RelayConfig,
) -> ConnectionState
where
    R: Stream<Item = Inbound> + Unpin,
    S: FragmentSink + 'static,
{
    let mut queue: VecDeque<String> = VecDeque::new();
    state.phase = ConnectionPhase::Idle;

    loop {
        tokio::select! {
            event = inbound.next() => match event {
                Some(Inbound::Text(message)) => {
                    if state.is_streaming() && queue.len() >= config.max_queued_messages {
                        tracing::warn!(
                            queued = queue.len(),
                            limit = config.max_queued_messages,
                            "Message queue full, dropping message"
                        );
                        if let Some(notice) = &config.queue_full_notice {
                            let sent = sink.lock().await.send_fragment(notice.clone()).await;
                            if sent.is_err() {
                                break;
                            }
                        }
                    } else {
                        queue.push_back(message);
                    }
                }
                Some(Inbound::Close) | None => break,
            },
            outcome = join_active(&mut state.active_generation) => {
                state.active_generation = None;
                state.phase = ConnectionPhase::Idle;
                log_outcome(&outcome, generator.name());
                if matches!(outcome, TurnOutcome::ClientGone { .. }) {
                    break;
                }
            }
        }

        if !state.is_streaming() {
            if let Some(message) = queue.pop_front() {
                let prompt = compose_prompt(state.context(), &message);
                tracing::debug!(
                    message_chars = message.len(),
                    prompt_chars = prompt.len(),
                    queued = queue.len(),
                    "Starting turn"
                );
                state.active_generation = Some(tokio::spawn(turn::run_turn_owned(
                    generator.clone(),
                    prompt,
                    sink.clone(),
                    config.end_of_turn_marker.clone(),
                )));
                state.phase = ConnectionPhase::Streaming;
            }
        }
    }

    if let Some(handle) = state.active_generation.take() {
        handle.abort();
        // Wait for the task to unwind so the upstream stream is gone on return
        let _ = handle.await;
        tracing::info!("Connection closed mid-turn, generation cancelled");
    }
    if !queue.is_empty() {
        tracing::debug!(dropped = queue.len(), "Discarding queued messages on close");
    }

    state.phase = ConnectionPhase::Closed;
    state
}

async fn join_active(slot: &mut Option<JoinHandle<TurnOutcome>>) -> TurnOutcome {
    match slot.as_mut() {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => TurnOutcome::Aborted(e.to_string()),
        },
        None => std::future::pending().await,
    }
}

fn log_outcome(outcome: &TurnOutcome, backend: &str) {
    match outcome {
        TurnOutcome::Completed { fragments } => {
            tracing::info!(backend, fragments, "Turn completed");
        }
        TurnOutcome::UpstreamFailed { fragments, error } => {
            tracing::warn!(
                backend,
                fragments,
                error_type = error.category(),
                error = %error,
                "Upstream generation failed"
            );
        }
        TurnOutcome::ClientGone { fragments, error } => {
            tracing::info!(backend, fragments, error = %error, "Client went away mid-turn");
        }
        TurnOutcome::Aborted(reason) => {
            tracing::error!(backend, reason = %reason, "Turn task failed");
        }
    }
}
