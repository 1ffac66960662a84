//! Ollama-compatible streaming generation client
//!
//! Issues `POST {base_url}/api/generate` with `stream: true` and decodes the
//! newline-delimited JSON body as it arrives.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use super::{FragmentStream, GenerationClient, NdjsonFragments};
use crate::config::UpstreamConfig;
use crate::error::{DocchatError, Result, UpstreamError};

/// Request body for the generate endpoint
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Streaming client for an Ollama-style generate API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaClient {
    /// Create a client from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let endpoint = format!("{}/api/generate", config.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| DocchatError::Config(format!("Invalid upstream URL '{endpoint}': {e}")))?;

        let client = Client::builder()
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DocchatError::Config(format!("Failed to create HTTP client: {e}")))?;

        tracing::info!(
            "Generation client initialized with model: {}, endpoint: {}",
            config.model,
            endpoint
        );

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn stream(&self, prompt: &str) -> std::result::Result<FragmentStream, UpstreamError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            prompt_chars = prompt.len(),
            "Starting upstream generation"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Network(format!("Request timed out: {e}"))
                } else if e.is_connect() {
                    UpstreamError::Network(format!("Failed to connect to upstream: {e}"))
                } else {
                    UpstreamError::Network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(NdjsonFragments::new(Box::pin(
            response.bytes_stream(),
        ))))
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
