//! Short-lived store for extracted document context
//!
//! Holds at most one [`ExtractedContext`] per correlation token. Entries
//! expire after the session's idle TTL; reads refresh the idle timer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::session::CorrelationToken;

/// Text extracted from one upload
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContext {
    /// Extracted document text
    pub text: String,
    /// Original filename as sent by the client
    pub filename: String,
    /// When the upload was processed
    pub uploaded_at: DateTime<Utc>,
}

impl ExtractedContext {
    pub fn new(text: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filename: filename.into(),
            uploaded_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    context: ExtractedContext,
    last_access: Instant,
}

/// Concurrent token-keyed context store with idle expiry
#[derive(Debug)]
pub struct ContextStore {
    entries: DashMap<CorrelationToken, Entry>,
    ttl: Duration,
}

impl ContextStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store context for a token, replacing any previous upload
    pub fn put(&self, token: CorrelationToken, context: ExtractedContext) {
        let replaced = self
            .entries
            .insert(
                token.clone(),
                Entry {
                    context,
                    last_access: Instant::now(),
                },
            )
            .is_some();

        if replaced {
            tracing::debug!(token = %token, "Replaced stored context");
        }
    }

    /// Copy out the context for a token, refreshing its idle timer
    pub fn peek(&self, token: &CorrelationToken) -> Option<ExtractedContext> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(token)?;
        if self.is_expired(&entry, now) {
            drop(entry);
            self.entries.remove_if(token, |_, e| self.is_expired(e, now));
            return None;
        }
        entry.last_access = now;
        Some(entry.context.clone())
    }

    /// Remove and return the context for a token
    pub fn take(&self, token: &CorrelationToken) -> Option<ExtractedContext> {
        let now = Instant::now();
        let (_, entry) = self.entries.remove(token)?;
        (!self.is_expired(&entry, now)).then_some(entry.context)
    }

    /// Drop the context for a token, if any
    pub fn remove(&self, token: &CorrelationToken) -> bool {
        self.entries.remove(token).is_some()
    }

    /// Drop every entry idle for longer than the TTL, returning how many went
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_access) > self.ttl
    }
}

/// Periodically purge expired contexts until the task is aborted
pub fn spawn_sweeper(store: Arc<ContextStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = store.len(), "Swept expired contexts");
            }
        }
    })
}
