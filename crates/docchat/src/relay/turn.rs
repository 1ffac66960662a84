//! One message-to-response cycle

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::FragmentSink;
use crate::error::{ClientDisconnect, UpstreamError};
use crate::generation::GenerationClient;

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Upstream finished and every fragment was forwarded
    Completed { fragments: usize },
    /// Upstream failed; `fragments` were already forwarded and stay delivered
    UpstreamFailed {
        fragments: usize,
        error: UpstreamError,
    },
    /// The client went away mid-turn
    ClientGone {
        fragments: usize,
        error: ClientDisconnect,
    },
    /// The turn task itself died
    Aborted(String),
}

impl TurnOutcome {
    pub fn fragments(&self) -> usize {
        match self {
            TurnOutcome::Completed { fragments }
            | TurnOutcome::UpstreamFailed { fragments, .. }
            | TurnOutcome::ClientGone { fragments, .. } => *fragments,
            TurnOutcome::Aborted(_) => 0,
        }
    }
}

/// Stream one prompt upstream and forward every fragment to `sink`
///
/// Fragments are forwarded one at a time in arrival order, each as its own
/// frame. The upstream stream is dropped as soon as this returns, which
/// releases the upstream connection on every exit path.
pub async fn run_turn<G, S>(
    generator: &G,
    prompt: &str,
    sink: &Mutex<S>,
    end_of_turn_marker: Option<&str>,
) -> TurnOutcome
where
    G: GenerationClient + ?Sized,
    S: FragmentSink,
{
    let mut stream = match generator.stream(prompt).await {
        Ok(stream) => stream,
        Err(error) => return TurnOutcome::UpstreamFailed { fragments: 0, error },
    };

    let mut fragments = 0;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                if let Err(error) = sink.lock().await.send_fragment(fragment).await {
                    return TurnOutcome::ClientGone { fragments, error };
                }
                fragments += 1;
            }
            Err(error) => return TurnOutcome::UpstreamFailed { fragments, error },
        }
    }

    if let Some(marker) = end_of_turn_marker {
        if let Err(error) = sink.lock().await.send_fragment(marker.to_string()).await {
            return TurnOutcome::ClientGone { fragments, error };
        }
    }

    TurnOutcome::Completed { fragments }
}

/// Owned variant of [`run_turn`] suitable for `tokio::spawn`
pub(crate) async fn run_turn_owned<S>(
    generator: Arc<dyn GenerationClient>,
    prompt: String,
    sink: Arc<Mutex<S>>,
    end_of_turn_marker: Option<String>,
) -> TurnOutcome
where
    S: FragmentSink + 'static,
{
    run_turn(
        &*generator,
        &prompt,
        &*sink,
        end_of_turn_marker.as_deref(),
    )
    .await
}
