//! # Mnemos
//!
//! Memory and consolidation engine for a long-running conversational agent.
//!
//! Mnemos maintains a knowledge graph of discrete experiences (facts,
//! insights, curiosities, reflections) enriched with vector embeddings for
//! semantic retrieval, and a wake/sleep session lifecycle that turns raw
//! interaction data into durable identity changes: new graph nodes,
//! confidence-scored preferences and traits, and freshly generated open
//! questions.
//!
//! ## Architecture
//!
//! - Knowledge graph store: append-only nodes and edges over SQLite
//! - Embedding subsystem: remote provider with a deterministic lexical
//!   fallback, exact cosine search over the working set
//! - Wake protocol: context reconstruction at session start
//! - Sleep protocol: session consolidation into the Identity aggregate
//! - Preference emergence: pattern detection over the append-only choice log
//! - Autonomous explorer: background curiosity resolution
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnemos::{EngineConfig, GraphService, WakeService};
//!
//! let config = EngineConfig::load_default();
//! let wake = WakeService::new(graph, identity_store, config.wake);
//! let context = wake.wake("session-1", None)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{EmbeddingConfig, EngineConfig, ExplorerConfig, PreferenceConfig, WakeConfig};
pub use embedding::{cosine_similarity, Embedder, EmbeddingService};
pub use models::{
    Choice, CrystallizedPreference, Curiosity, CuriosityStatus, DiscoveredTrait, EdgeType,
    Identity, MemoryEdge, MemoryNode, NodeId, NodeType, Reflection, SessionSummary,
    TraitConfidence,
};
pub use services::{
    ConsolidationReport, ExplorationOutcome, ExplorationProvider, Explorer, GraphService,
    PreferenceEngine, SleepService, WakeContext, WakeService,
};
pub use storage::{IdentityStore, JsonIdentityStore, MemoryStore, SqliteStore};

/// Error type for engine operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Malformed entity: empty node content, edge to a nonexistent node, illegal curiosity transition |
/// | `NotFound` | A read of an id that is expected to exist misses |
/// | `StorageUnavailable` | The backing store is unreachable or a write fails |
/// | `EmbeddingUnavailable` | All embedding providers failed; recovered internally by node operations |
/// | `ConsolidationConflict` | A second sleep attempted while one is in progress |
/// | `Exploration` | The external exploration collaborator errored; caught per-cycle by the explorer |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A malformed entity was rejected.
    ///
    /// Surfaced to the caller, never retried automatically.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An entity that was expected to exist is missing.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity ("node", "curiosity", ...).
        entity: &'static str,
        /// The id that missed.
        id: String,
    },

    /// The backing store is unreachable or an operation against it failed.
    ///
    /// Wake/sleep callers treat this as a hard failure requiring
    /// user-visible reporting, not silent degradation.
    #[error("storage unavailable during '{operation}': {cause}")]
    StorageUnavailable {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// No embedding provider could produce a vector.
    ///
    /// Node operations recover from this locally (null embedding plus a
    /// degraded flag); it never surfaces as a user-facing failure from them.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A second consolidation was attempted while one is in flight.
    #[error("consolidation already in progress for session '{0}'")]
    ConsolidationConflict(String),

    /// The external exploration collaborator failed.
    #[error("exploration failed: {0}")]
    Exploration(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("empty content".to_string());
        assert_eq!(err.to_string(), "validation failed: empty content");

        let err = Error::NotFound {
            entity: "node",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "node not found: abc");

        let err = Error::StorageUnavailable {
            operation: "create_node".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage unavailable during 'create_node': disk full"
        );

        let err = Error::ConsolidationConflict("s1".to_string());
        assert!(err.to_string().contains("s1"));
    }
}
