//! Remote embedding provider.
//!
//! Talks to an Ollama-compatible embedding endpoint over HTTP. Availability
//! is probed once at startup via the tags endpoint; every embedding call is
//! bounded by the configured timeout so node creation can degrade instead
//! of blocking.

use super::Embedder;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REMOTE_DIMENSIONS: usize = 768;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// HTTP client for a remote embedding model.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl RemoteEmbedder {
    /// Creates a client for the given endpoint and model.
    #[must_use]
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Probes the endpoint. Used at startup to decide whether this provider
    /// participates at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "embedding endpoint probe failed");
                false
            }
        }
    }

    fn classify(e: &reqwest::Error) -> &'static str {
        if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else {
            "request"
        }
    }
}

impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        REMOTE_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| {
                Error::EmbeddingUnavailable(format!(
                    "{} error calling {url}: {e}",
                    Self::classify(&e)
                ))
            })?;

        if !response.status().is_success() {
            return Err(Error::EmbeddingUnavailable(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::EmbeddingUnavailable(format!("malformed response: {e}")))?;

        if body.embedding.is_empty() {
            return Err(Error::EmbeddingUnavailable(
                "embedding endpoint returned an empty vector".to_string(),
            ));
        }

        Ok(body.embedding)
    }
}
