//! Test utilities for docchat - scripted backends and in-memory sinks
//!
//! This module provides:
//! - A scripted generation backend that records prompts and tracks open streams
//! - A channel-backed fragment sink standing in for a socket

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

use crate::error::{ClientDisconnect, UpstreamError};
use crate::generation::{FragmentStream, GenerationClient};
use crate::relay::FragmentSink;

/// One step of a scripted generation
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Yield a fragment
    Fragment(String),
    /// Yield an error and end the stream
    Fail(UpstreamError),
    /// Wait for a notification before continuing
    Gate(Arc<Notify>),
    /// Never yield again
    Hang,
}

/// Generation backend driven by predefined scripts.
///
/// Each call to `stream` consumes the next script; the last one repeats once
/// the list runs out.
#[derive(Debug)]
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    last: Mutex<Vec<ScriptStep>>,
    connect_error: Option<UpstreamError>,
    prompts: Mutex<Vec<String>>,
    open: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    /// Every call plays the same script
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self::with_scripts(vec![steps])
    }

    /// Every call yields `fragments` and completes
    pub fn fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(
            fragments
                .into_iter()
                .map(|f| ScriptStep::Fragment(f.into()))
                .collect(),
        )
    }

    /// One script per call, in order
    pub fn with_scripts(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            last: Mutex::new(Vec::new()),
            connect_error: None,
            prompts: Mutex::new(Vec::new()),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every call fails before producing a stream
    pub fn failing(error: UpstreamError) -> Self {
        Self {
            connect_error: Some(error),
            ..Self::with_scripts(Vec::new())
        }
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Streams handed out and not yet dropped
    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<ScriptStep> {
        let (Ok(mut scripts), Ok(mut last)) = (self.scripts.lock(), self.last.lock()) else {
            return Vec::new();
        };
        if let Some(script) = scripts.pop_front() {
            *last = script;
        }
        last.clone()
    }
}

/// Decrements the open-stream counter when the stream is dropped
struct OpenStreamGuard(Arc<AtomicUsize>);

impl OpenStreamGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, UpstreamError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(error) = &self.connect_error {
            return Err(error.clone());
        }

        let guard = OpenStreamGuard::new(self.open.clone());
        let steps = self.next_script().into_iter();

        let stream = futures::stream::unfold((steps, guard), |(mut steps, guard)| async move {
            loop {
                match steps.next()? {
                    ScriptStep::Fragment(fragment) => return Some((Ok(fragment), (steps, guard))),
                    ScriptStep::Fail(error) => {
                        // Nothing follows a failure
                        return Some((Err(error), (Vec::new().into_iter(), guard)));
                    }
                    ScriptStep::Gate(notify) => notify.notified().await,
                    ScriptStep::Hang => std::future::pending::<()>().await,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Fragment sink writing into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

/// Create a sink and the receiver observing what it was sent
pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

#[async_trait]
impl FragmentSink for ChannelSink {
    async fn send_fragment(&mut self, text: String) -> Result<(), ClientDisconnect> {
        self.tx
            .send(text)
            .map_err(|_| ClientDisconnect("receiver dropped".to_string()))
    }
}
