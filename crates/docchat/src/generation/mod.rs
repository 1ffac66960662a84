//! Upstream text generation
//!
//! A [`GenerationClient`] turns one prompt into a lazy, ordered stream of text
//! fragments. Dropping the stream abandons the upstream call and releases its
//! connection.

mod ndjson;
mod ollama;

pub use ndjson::NdjsonFragments;
pub use ollama::OllamaClient;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

use crate::error::UpstreamError;

/// One incremental unit of generated text
pub type Fragment = String;

/// Ordered fragments of a single generation call
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, UpstreamError>> + Send>>;

/// Trait for generation backends
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Start one streaming generation for `prompt`
    ///
    /// Errors raised before the first fragment (unreachable backend, bad
    /// status) are returned here; later failures arrive inside the stream.
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, UpstreamError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
