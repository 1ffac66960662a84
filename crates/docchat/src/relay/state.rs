//! Per-connection state and session correlation

use tokio::task::JoinHandle;

use super::turn::TurnOutcome;
use crate::context::ContextStore;
use crate::session::CorrelationToken;

/// Lifecycle of one persistent connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Context loaded, not yet serving messages
    Established,
    /// Waiting for the next message
    Idle,
    /// One generation in flight
    Streaming,
    /// Terminal
    Closed,
}

/// State owned by a single persistent connection
#[derive(Debug)]
pub struct ConnectionState {
    context: Option<String>,
    pub(crate) active_generation: Option<JoinHandle<TurnOutcome>>,
    pub(crate) phase: ConnectionPhase,
}

impl ConnectionState {
    /// State for a freshly established connection
    ///
    /// The context is fixed here and never changes for the connection's lifetime.
    pub fn established(context: Option<String>) -> Self {
        Self {
            context,
            active_generation: None,
            phase: ConnectionPhase::Established,
        }
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.active_generation.is_some()
    }
}

/// Build the state for a connection opened under `token`
///
/// Copies any stored context into the connection. A missing entry is the
/// normal "nothing uploaded" path, not an error.
pub fn correlate(store: &ContextStore, token: &CorrelationToken) -> ConnectionState {
    match store.peek(token) {
        Some(context) => {
            tracing::info!(
                token = %token,
                filename = %context.filename,
                context_chars = context.text.len(),
                "Correlated connection with uploaded context"
            );
            ConnectionState::established(Some(context.text))
        }
        None => {
            tracing::debug!(token = %token, "No stored context for connection");
            ConnectionState::established(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExtractedContext;
    use std::time::Duration;

    fn token(n: u128) -> CorrelationToken {
        CorrelationToken::from(uuid::Uuid::from_u128(n))
    }

    #[test]
    fn test_correlate_hit() {
        let store = ContextStore::new(Duration::from_secs(60));
        store.put(token(1), ExtractedContext::new("resume", "cv.pdf"));

        let state = correlate(&store, &token(1));
        assert_eq!(state.context(), Some("resume"));
        assert_eq!(state.phase(), ConnectionPhase::Established);
        assert!(!state.is_streaming());
    }

    #[test]
    fn test_correlate_miss() {
        let store = ContextStore::new(Duration::from_secs(60));
        store.put(token(1), ExtractedContext::new("resume", "cv.pdf"));

        let state = correlate(&store, &token(2));
        assert_eq!(state.context(), None);
    }

    #[test]
    fn test_connection_copy_is_independent_of_store() {
        let store = ContextStore::new(Duration::from_secs(60));
        store.put(token(1), ExtractedContext::new("first", "v1.pdf"));

        let state = correlate(&store, &token(1));
        store.put(token(1), ExtractedContext::new("second", "v2.pdf"));
        store.remove(&token(1));

        assert_eq!(state.context(), Some("first"));
    }

    #[test]
    fn test_latest_upload_wins_before_correlation() {
        let store = ContextStore::new(Duration::from_secs(60));
        store.put(token(1), ExtractedContext::new("older", "v1.pdf"));
        store.put(token(1), ExtractedContext::new("newer", "v2.pdf"));

        assert_eq!(correlate(&store, &token(1)).context(), Some("newer"));
    }
}
