//! Knowledge graph operations.
//!
//! Wraps the raw store with embedding-aware behavior: node creation embeds
//! best-effort, semantic search and relatedness run exact cosine over the
//! working set, and the auto-linker densifies the graph with `similar_to`
//! edges above a strict threshold.

use crate::config::EmbeddingConfig;
use crate::embedding::{cosine_similarity, Embedder, EmbeddingService};
use crate::models::{EdgeType, MemoryEdge, MemoryNode, NodeId};
use crate::storage::{MemoryStore, NodeQuery};
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Result of node creation.
#[derive(Debug, Clone)]
pub struct CreateNodeResult {
    /// The persisted node.
    pub node: MemoryNode,
    /// True when no embedding provider could produce a vector and the node
    /// was stored without one. The node is still fully created.
    pub embedding_degraded: bool,
}

/// A semantic search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matching node.
    pub node: MemoryNode,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// A cluster of mutually similar nodes.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Representative text, taken from the most important member.
    pub representative: String,
    /// Member node ids.
    pub node_ids: Vec<NodeId>,
}

/// Knowledge graph service.
pub struct GraphService {
    store: Arc<dyn MemoryStore>,
    embedding: Arc<EmbeddingService>,
    config: EmbeddingConfig,
}

impl GraphService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedding: Arc<EmbeddingService>,
        config: EmbeddingConfig,
    ) -> Self {
        Self {
            store,
            embedding,
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Name of the embedding provider currently in use.
    #[must_use]
    pub fn embedding_provider(&self) -> &'static str {
        self.embedding.provider_name()
    }

    /// Persists a node, embedding its text best-effort.
    ///
    /// Embedding failure degrades to a null embedding rather than failing
    /// the creation; the result carries a flag so callers can report it.
    ///
    /// # Errors
    ///
    /// `Validation` for empty content, `StorageUnavailable` on write
    /// failure.
    #[instrument(skip_all, fields(node_type = %node.node_type))]
    pub fn create_node(&self, mut node: MemoryNode) -> Result<CreateNodeResult> {
        let mut embedding_degraded = false;
        match self.embedding.embed(&node.embedding_text()) {
            Ok(vector) => node.embedding = Some(vector),
            Err(e) => {
                tracing::warn!(error = %e, "node stored without embedding");
                embedding_degraded = true;
            }
        }
        self.store.create_node(&node)?;
        metrics::counter!("mnemos_nodes_created_total").increment(1);
        if embedding_degraded {
            metrics::counter!("mnemos_embeddings_degraded_total").increment(1);
        }
        Ok(CreateNodeResult {
            node,
            embedding_degraded,
        })
    }

    /// Fetches a node, recording the access.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such node exists.
    pub fn get_node(&self, id: &NodeId) -> Result<MemoryNode> {
        let mut node = self.store.get_node(id)?;
        node.record_access();
        self.store.update_node(&node)?;
        Ok(node)
    }

    /// Updates a node's text fields, recomputing its embedding when the
    /// embedded text changed.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing node, `Validation` for empty content.
    #[instrument(skip_all, fields(id = %id))]
    pub fn update_node(
        &self,
        id: &NodeId,
        content: Option<String>,
        summary: Option<String>,
        importance: Option<f32>,
    ) -> Result<MemoryNode> {
        let mut node = self.store.get_node(id)?;
        let before = node.embedding_text();

        if let Some(content) = content {
            if content.trim().is_empty() {
                return Err(crate::Error::Validation(
                    "node content must not be empty".into(),
                ));
            }
            node.content = content;
        }
        if let Some(summary) = summary {
            node.summary = Some(summary);
        }
        if let Some(importance) = importance {
            node.importance = importance.clamp(0.0, 1.0);
        }

        if node.embedding_text() != before {
            // The whole vector is recomputed, never patched.
            node.embedding = self.embedding.embed(&node.embedding_text()).ok();
        }
        node.updated_at = chrono::Utc::now();
        self.store.update_node(&node)?;
        Ok(node)
    }

    /// Creates a typed edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// `Validation` when either endpoint is missing; nothing is created.
    pub fn create_edge(
        &self,
        source: &NodeId,
        target: &NodeId,
        edge_type: EdgeType,
        weight: f32,
        description: Option<String>,
    ) -> Result<MemoryEdge> {
        let mut edge = MemoryEdge::new(source.clone(), target.clone(), edge_type, weight);
        if let Some(description) = description {
            edge = edge.with_description(description);
        }
        self.store.create_edge(&edge)?;
        metrics::counter!("mnemos_edges_created_total").increment(1);
        Ok(edge)
    }

    /// Exact cosine search over all embedded nodes, best first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on read failure, `EmbeddingUnavailable` when
    /// the query itself cannot be embedded.
    #[instrument(skip(self, query))]
    pub fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query_vector = self.embedding.embed(query)?;
        let nodes = self.store.list_nodes(&NodeQuery::all())?;

        let mut hits: Vec<SearchHit> = nodes
            .into_iter()
            .filter_map(|node| {
                let embedding = node.embedding.as_ref()?;
                if embedding.len() != query_vector.len() {
                    // Stored under a different provider; not comparable
                    // until regenerate_embeddings has run.
                    tracing::debug!(id = %node.id, "skipping node with stale embedding dimensions");
                    return None;
                }
                let similarity = cosine_similarity(&query_vector, embedding);
                Some(SearchHit { node, similarity })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Nodes semantically related to the given node, above the configured
    /// relatedness threshold, excluding the node itself and neighbors it is
    /// already linked to.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing node, `StorageUnavailable` on read failure.
    pub fn related_nodes(&self, id: &NodeId, limit: usize) -> Result<Vec<SearchHit>> {
        let anchor = self.store.get_node(id)?;
        let Some(anchor_embedding) = anchor.embedding.as_ref() else {
            return Ok(Vec::new());
        };

        let nodes = self.store.list_nodes(&NodeQuery::all())?;
        let mut hits = Vec::new();
        for node in nodes {
            if node.id == anchor.id {
                continue;
            }
            let Some(embedding) = node.embedding.as_ref() else {
                continue;
            };
            let similarity = cosine_similarity(anchor_embedding, embedding);
            if similarity < self.config.related_threshold {
                continue;
            }
            if self.store.edge_exists_between(id, &node.id)? {
                continue;
            }
            hits.push(SearchHit { node, similarity });
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Creates `similar_to` edges from a node to its nearest neighbors
    /// above the auto-link threshold, skipping pairs already connected.
    ///
    /// Returns the edges created, at most the configured cap.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing node, `StorageUnavailable` on failure.
    #[instrument(skip_all, fields(id = %id))]
    pub fn auto_link(&self, id: &NodeId) -> Result<Vec<MemoryEdge>> {
        let candidates = self.related_nodes(id, self.config.auto_link_max_edges * 2)?;
        let mut created = Vec::new();

        for hit in candidates {
            if created.len() >= self.config.auto_link_max_edges {
                break;
            }
            if hit.similarity < self.config.auto_link_threshold {
                continue;
            }
            if self.store.edge_exists_between(id, &hit.node.id)? {
                continue;
            }
            let edge = MemoryEdge::new(
                id.clone(),
                hit.node.id.clone(),
                EdgeType::SimilarTo,
                hit.similarity,
            );
            self.store.create_edge(&edge)?;
            created.push(edge);
        }
        if !created.is_empty() {
            metrics::counter!("mnemos_auto_links_total").increment(created.len() as u64);
        }
        Ok(created)
    }

    /// Threshold clustering of all embedded nodes: a greedy seeding pass
    /// followed by one centroid reassignment pass. The cluster count is
    /// discovered, not fixed; representatives come from the most important
    /// member.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on read failure.
    pub fn clusters(&self) -> Result<Vec<Cluster>> {
        let nodes = self.store.list_nodes(&NodeQuery::all())?;
        let embedded: Vec<&MemoryNode> = nodes.iter().filter(|n| n.embedding.is_some()).collect();
        if embedded.is_empty() {
            return Ok(Vec::new());
        }

        // Seeding pass: join the first cluster whose centroid clears the
        // threshold, otherwise found a new one.
        let mut centroids: Vec<Vec<f32>> = Vec::new();
        let mut assignments: Vec<usize> = Vec::with_capacity(embedded.len());
        for node in &embedded {
            let Some(embedding) = node.embedding.as_ref() else {
                continue;
            };
            let best = centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, cosine_similarity(embedding, c)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            match best {
                Some((i, similarity)) if similarity >= self.config.cluster_threshold => {
                    assignments.push(i);
                    Self::fold_into_centroid(&mut centroids[i], embedding);
                }
                _ => {
                    assignments.push(centroids.len());
                    centroids.push(embedding.clone());
                }
            }
        }

        // Refinement pass: reassign against the settled centroids.
        for (slot, node) in embedded.iter().enumerate() {
            let Some(embedding) = node.embedding.as_ref() else {
                continue;
            };
            if let Some((best, similarity)) = centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, cosine_similarity(embedding, c)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            {
                if similarity >= self.config.cluster_threshold {
                    assignments[slot] = best;
                }
            }
        }

        let mut clusters: Vec<(Option<&MemoryNode>, Vec<NodeId>)> =
            vec![(None, Vec::new()); centroids.len()];
        for (slot, node) in embedded.iter().enumerate() {
            let (representative, members) = &mut clusters[assignments[slot]];
            members.push(node.id.clone());
            let more_important =
                representative.map_or(true, |current| node.importance > current.importance);
            if more_important {
                *representative = Some(node);
            }
        }

        Ok(clusters
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(representative, node_ids)| Cluster {
                representative: representative
                    .map(|n| n.summary.clone().unwrap_or_else(|| n.content.clone()))
                    .unwrap_or_default(),
                node_ids,
            })
            .collect())
    }

    fn fold_into_centroid(centroid: &mut [f32], embedding: &[f32]) {
        for (c, v) in centroid.iter_mut().zip(embedding) {
            *c = (*c + v) / 2.0;
        }
    }

    /// Re-embeds every node with the active provider, persisting each node
    /// as it goes so an interrupted run resumes where it left off.
    ///
    /// Returns how many nodes were re-embedded.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on failure; `EmbeddingUnavailable` when a
    /// vector cannot be produced at all.
    #[instrument(skip_all)]
    pub fn regenerate_embeddings(&self) -> Result<usize> {
        let nodes = self.store.list_nodes(&NodeQuery::all())?;
        let mut updated = 0usize;
        for mut node in nodes {
            let vector = self.embedding.embed(&node.embedding_text())?;
            node.embedding = Some(vector);
            self.store.update_node(&node)?;
            updated += 1;
        }
        tracing::info!(
            updated,
            provider = self.embedding.provider_name(),
            "embeddings regenerated"
        );
        Ok(updated)
    }
}
