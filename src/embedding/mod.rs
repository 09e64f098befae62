//! Embedding generation and similarity.
//!
//! Two interchangeable providers: a remote embedding model (preferred,
//! higher quality) and a deterministic lexical fallback (always available,
//! no external dependency). The active provider is selected once at startup
//! by probing availability, and the choice is exposed so callers know the
//! precision they are getting.

#![allow(clippy::cast_precision_loss)]

mod lexical;
mod remote;

pub use lexical::LexicalEmbedder;
pub use remote::RemoteEmbedder;

use crate::config::EmbeddingConfig;
use crate::{Error, Result};

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Cosine similarity between two vectors.
///
/// Vectors of different lengths come from different providers and are not
/// comparable; mismatched lengths and zero vectors yield 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Which provider the service resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveProvider {
    /// Service-backed embedding model.
    Remote,
    /// Local statistical fallback.
    Lexical,
}

impl ActiveProvider {
    /// Returns the provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Lexical => "lexical",
        }
    }
}

/// Unified embedding service with startup probing and silent fallback.
///
/// Probes the configured provider order once at construction. Remote
/// failures during operation fall back to the lexical provider for that
/// call and demote the active provider, so `EmbeddingUnavailable` never
/// reaches callers of node operations.
pub struct EmbeddingService {
    remote: Option<RemoteEmbedder>,
    lexical: LexicalEmbedder,
    active: std::sync::atomic::AtomicBool, // true = remote
}

impl EmbeddingService {
    /// Probes providers in the configured order and selects the first
    /// available one.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut remote = None;
        let mut use_remote = false;

        for name in &config.provider_order {
            match name.as_str() {
                "remote" => {
                    let candidate = RemoteEmbedder::new(
                        &config.remote_url,
                        &config.remote_model,
                        config.timeout,
                    );
                    if candidate.is_available() {
                        tracing::info!(provider = "remote", url = %config.remote_url, "embedding provider selected");
                        remote = Some(candidate);
                        use_remote = true;
                        break;
                    }
                    tracing::debug!(url = %config.remote_url, "remote embedding provider unavailable");
                }
                "lexical" => {
                    tracing::info!(provider = "lexical", "embedding provider selected");
                    break;
                }
                other => {
                    tracing::warn!(provider = other, "unknown embedding provider in order, skipping");
                }
            }
        }

        Self {
            remote,
            lexical: LexicalEmbedder::new(),
            active: std::sync::atomic::AtomicBool::new(use_remote),
        }
    }

    /// A service that always uses the lexical provider. Deterministic;
    /// useful for tests.
    #[must_use]
    pub fn lexical_only() -> Self {
        Self {
            remote: None,
            lexical: LexicalEmbedder::new(),
            active: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// The name of the active provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.active_provider().as_str()
    }

    /// The active provider.
    #[must_use]
    pub fn active_provider(&self) -> ActiveProvider {
        if self.active.load(std::sync::atomic::Ordering::Relaxed) {
            ActiveProvider::Remote
        } else {
            ActiveProvider::Lexical
        }
    }

    fn demote(&self, cause: &Error) {
        tracing::warn!(error = %cause, "remote embedding failed, falling back to lexical provider");
        self.active
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Embedder for EmbeddingService {
    fn dimensions(&self) -> usize {
        match self.active_provider() {
            ActiveProvider::Remote => self
                .remote
                .as_ref()
                .map_or_else(|| self.lexical.dimensions(), Embedder::dimensions),
            ActiveProvider::Lexical => self.lexical.dimensions(),
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.active_provider() == ActiveProvider::Remote {
            if let Some(remote) = &self.remote {
                match remote.embed(text) {
                    Ok(vector) => return Ok(vector),
                    Err(e) => self.demote(&e),
                }
            }
        }
        self.lexical.embed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.2, 0.4, 0.4];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[], &b).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_mismatched_lengths_not_comparable() {
        // A remote-era vector against a lexical-era one must never score;
        // a prefix comparison would report 1.0 here.
        let remote = vec![0.05f32; 768];
        let lexical = vec![0.05f32; 384];
        assert!(cosine_similarity(&remote, &lexical).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lexical_only_service() {
        let service = EmbeddingService::lexical_only();
        assert_eq!(service.provider_name(), "lexical");
        let v = service.embed("an honest octahedron");
        assert!(v.is_ok());
        if let Ok(v) = v {
            assert_eq!(v.len(), service.dimensions());
        }
    }
}
