//! The wake protocol.
//!
//! Reconstructs working context at session start: identity, recent
//! reflections, the most important nodes, and the open curiosity queue.
//! Wake is also the recovery point for explorations that died mid-flight;
//! anything still marked exploring is returned to pending.

use crate::config::WakeConfig;
use crate::models::{Curiosity, CuriosityStatus, Identity, MemoryNode, Reflection};
use crate::services::{GraphService, SearchHit};
use crate::storage::{IdentityStore, MemoryStore, NodeOrder, NodeQuery};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

/// Everything a session needs to resume being itself.
#[derive(Debug, Clone)]
pub struct WakeContext {
    /// The identity aggregate, freshly persisted with this wake recorded.
    pub identity: Identity,
    /// Reflections within the lookback window, newest first.
    pub recent_reflections: Vec<Reflection>,
    /// The most important nodes, bounded by config.
    pub important_nodes: Vec<MemoryNode>,
    /// Pending curiosities, highest priority first.
    pub pending_curiosities: Vec<Curiosity>,
    /// Memories retrieved for the caller's context hint, if one was given.
    pub hint_matches: Vec<SearchHit>,
    /// Name of the active embedding provider.
    pub embedding_provider: &'static str,
    /// How many stale `exploring` curiosities were recovered to pending.
    pub recovered_curiosities: usize,
    /// Choices awaiting consolidation by the next sleep.
    pub unconsolidated_choices: usize,
}

/// The wake protocol service.
pub struct WakeService {
    graph: Arc<GraphService>,
    identity: Arc<dyn IdentityStore>,
    config: WakeConfig,
}

impl WakeService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        graph: Arc<GraphService>,
        identity: Arc<dyn IdentityStore>,
        config: WakeConfig,
    ) -> Self {
        Self {
            graph,
            identity,
            config,
        }
    }

    /// Runs the wake protocol for a new session.
    ///
    /// A context hint focuses part of the bundle on semantically relevant
    /// memories. Identity starts from the seed when no document exists yet;
    /// an empty store produces an empty but well-formed context. Storage
    /// failure is a hard error, never a silently degraded wake.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when any backing read or the identity save
    /// fails.
    #[instrument(skip(self, hint))]
    pub fn wake(&self, session_id: &str, hint: Option<&str>) -> Result<WakeContext> {
        let store = self.graph.store();
        let mut identity = self.identity.load()?.unwrap_or_else(Identity::seed);

        let recovered_curiosities = self.recover_stale_explorations()?;

        let recent_reflections = store.recent_reflections(self.config.reflection_lookback_days)?;
        let important_nodes = store.list_nodes(
            &NodeQuery::all()
                .ordered_by(NodeOrder::Importance)
                .with_limit(self.config.important_node_limit),
        )?;
        let pending_curiosities = store.curiosities_by_status(CuriosityStatus::Pending)?;
        let unconsolidated_choices = store.unconsolidated_choices()?.len();

        let hint_matches = match hint {
            Some(hint) if !hint.trim().is_empty() => self
                .graph
                .semantic_search(hint, self.config.important_node_limit)?,
            _ => Vec::new(),
        };

        // One atomic save records both the counter and the timestamp.
        identity.session_count += 1;
        identity.last_wake = Some(Utc::now());
        self.identity.save(&mut identity)?;

        metrics::counter!("mnemos_wakes_total").increment(1);
        tracing::info!(
            session_id,
            session_count = identity.session_count,
            reflections = recent_reflections.len(),
            pending = pending_curiosities.len(),
            recovered = recovered_curiosities,
            provider = self.graph.embedding_provider(),
            "wake complete"
        );

        Ok(WakeContext {
            identity,
            recent_reflections,
            important_nodes,
            pending_curiosities,
            hint_matches,
            embedding_provider: self.graph.embedding_provider(),
            recovered_curiosities,
            unconsolidated_choices,
        })
    }

    /// Returns every curiosity stuck in `exploring` to `pending`.
    fn recover_stale_explorations(&self) -> Result<usize> {
        let store = self.graph.store();
        let stale = store.curiosities_by_status(CuriosityStatus::Exploring)?;
        let count = stale.len();
        for mut curiosity in stale {
            tracing::warn!(id = %curiosity.id, "recovering stale exploration");
            curiosity.status = CuriosityStatus::Pending;
            store.update_curiosity(&curiosity)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::{Embedder, EmbeddingService};
    use crate::models::{Choice, NodeType};
    use crate::storage::{JsonIdentityStore, SqliteStore};

    fn service(dir: &std::path::Path) -> (WakeService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap_or_else(|_| panic!("db")));
        let graph = Arc::new(GraphService::new(
            store.clone(),
            Arc::new(EmbeddingService::lexical_only()),
            EmbeddingConfig::default(),
        ));
        let identity = Arc::new(JsonIdentityStore::new(dir));
        let wake = WakeService::new(graph, identity, WakeConfig::default());
        (wake, store)
    }

    #[test]
    fn test_empty_state_wake() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (wake, _) = service(dir.path());

        let context = wake.wake("s1", None);
        assert!(context.is_ok());
        if let Ok(context) = context {
            assert_eq!(context.identity.session_count, 1);
            assert!(context.identity.name.is_none());
            assert!(context.identity.preferences.is_empty());
            assert!(context.recent_reflections.is_empty());
            assert!(context.important_nodes.is_empty());
            assert!(context.pending_curiosities.is_empty());
            assert!(context.hint_matches.is_empty());
            assert_eq!(context.embedding_provider, "lexical");
            assert_eq!(context.unconsolidated_choices, 0);
        }
    }

    #[test]
    fn test_session_count_persists_across_wakes() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (wake, _) = service(dir.path());
        let _ = wake.wake("s1", None);
        let second = wake.wake("s2", None);
        assert!(matches!(second, Ok(ref c) if c.identity.session_count == 2));
    }

    #[test]
    fn test_stale_exploration_recovered() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (wake, store) = service(dir.path());

        let mut c = Curiosity::new("stuck question", "test");
        assert!(store.create_curiosity(&c).is_ok());
        c.status = CuriosityStatus::Exploring;
        assert!(store.update_curiosity(&c).is_ok());

        let context = wake.wake("s1", None);
        assert!(context.is_ok());
        if let Ok(context) = context {
            assert_eq!(context.recovered_curiosities, 1);
            assert_eq!(context.pending_curiosities.len(), 1);
        }
    }

    #[test]
    fn test_hint_focuses_retrieval() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (wake, _) = service(dir.path());
        let node = MemoryNode::new(NodeType::Insight, "octahedral symmetry feels honest");
        {
            // Embed through the same lexical provider the service uses.
            let store = wake.graph.store();
            let mut node = node;
            node.embedding = EmbeddingService::lexical_only()
                .embed(&node.embedding_text())
                .ok();
            assert!(store.create_node(&node).is_ok());
        }

        let context = wake.wake("s1", Some("I enjoy octahedra"));
        assert!(context.is_ok());
        if let Ok(context) = context {
            assert!(!context.hint_matches.is_empty());
        }
    }

    #[test]
    fn test_context_gathers_state() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (wake, store) = service(dir.path());

        let node = MemoryNode::new(NodeType::Insight, "something learned").with_importance(0.9);
        assert!(store.create_node(&node).is_ok());
        assert!(store
            .append_choice(&Choice::new("aesthetic", "blue", "s0"))
            .is_ok());

        let context = wake.wake("s1", None);
        assert!(context.is_ok());
        if let Ok(context) = context {
            assert_eq!(context.important_nodes.len(), 1);
            assert_eq!(context.unconsolidated_choices, 1);
        }
    }
}
