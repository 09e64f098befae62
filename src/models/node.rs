//! Knowledge graph node and edge types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random node ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The kind of experience a node records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// An abstract idea.
    Concept,
    /// Concrete knowledge.
    Fact,
    /// Discovered understanding.
    Insight,
    /// A question to explore.
    Curiosity,
    /// Work being done.
    Project,
    /// A session record.
    Conversation,
    /// A consolidated reflection.
    Reflection,
}

impl NodeType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Concept => "concept",
            Self::Fact => "fact",
            Self::Insight => "insight",
            Self::Curiosity => "curiosity",
            Self::Project => "project",
            Self::Conversation => "conversation",
            Self::Reflection => "reflection",
        }
    }

    /// Parses from the canonical string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "concept" => Some(Self::Concept),
            "fact" => Some(Self::Fact),
            "insight" => Some(Self::Insight),
            "curiosity" => Some(Self::Curiosity),
            "project" => Some(Self::Project),
            "conversation" => Some(Self::Conversation),
            "reflection" => Some(Self::Reflection),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of recorded experience in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    /// Unique identifier.
    pub id: NodeId,
    /// The kind of experience this node records.
    pub node_type: NodeType,
    /// Free-text content. Never empty.
    pub content: String,
    /// Optional short version for quick recall.
    pub summary: Option<String>,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// The session that produced this node, if any.
    pub session_id: Option<String>,
    /// Opaque metadata map.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Tags for categorization.
    pub tags: BTreeSet<String>,
    /// Embedding vector, present once computed.
    ///
    /// Dimensionality is constant within one provider configuration. The
    /// vector is recomputed whole when content changes, never patched.
    pub embedding: Option<Vec<f32>>,
    /// Number of recorded accesses.
    pub access_count: u32,
}

impl MemoryNode {
    /// Creates a new node with the given type and content.
    #[must_use]
    pub fn new(node_type: NodeType, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::generate(),
            node_type,
            content: content.into(),
            summary: None,
            importance: 0.5,
            created_at: now,
            updated_at: now,
            session_id: None,
            metadata: serde_json::Map::new(),
            tags: BTreeSet::new(),
            embedding: None,
            access_count: 0,
        }
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the importance, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Sets the owning session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// The text used for embedding: summary plus content when a summary
    /// exists, content alone otherwise.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{summary} {}", self.content),
            None => self.content.clone(),
        }
    }

    /// Records an access, nudging importance up slightly (capped at 1.0).
    pub fn record_access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.importance = (self.importance + 0.01).min(1.0);
        self.updated_at = Utc::now();
    }
}

/// The kind of relation an edge expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// General connection.
    RelatedTo,
    /// Causal or logical flow.
    LeadsTo,
    /// Tension or conflict.
    Contradicts,
    /// Reinforcement.
    Supports,
    /// Hierarchical containment.
    PartOf,
    /// Provenance.
    DerivedFrom,
    /// Created by the auto-linker from embedding similarity.
    SimilarTo,
}

impl EdgeType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RelatedTo => "related_to",
            Self::LeadsTo => "leads_to",
            Self::Contradicts => "contradicts",
            Self::Supports => "supports",
            Self::PartOf => "part_of",
            Self::DerivedFrom => "derived_from",
            Self::SimilarTo => "similar_to",
        }
    }

    /// Parses from the canonical string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "related_to" => Some(Self::RelatedTo),
            "leads_to" => Some(Self::LeadsTo),
            "contradicts" => Some(Self::Contradicts),
            "supports" => Some(Self::Supports),
            "part_of" => Some(Self::PartOf),
            "derived_from" => Some(Self::DerivedFrom),
            "similar_to" => Some(Self::SimilarTo),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed relation between two existing nodes.
///
/// Edges are immutable once created. Both endpoints must exist at creation
/// time, which the store enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEdge {
    /// Unique identifier.
    pub id: String,
    /// Source node.
    pub source_id: NodeId,
    /// Target node.
    pub target_id: NodeId,
    /// Relation kind.
    pub edge_type: EdgeType,
    /// Strength of the connection in `[0.0, 1.0]`.
    pub weight: f32,
    /// Optional description of why this connection exists.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MemoryEdge {
    /// Creates a new edge between two node ids.
    #[must_use]
    pub fn new(source_id: NodeId, target_id: NodeId, edge_type: EdgeType, weight: f32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id,
            target_id,
            edge_type,
            weight: weight.clamp(0.0, 1.0),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trip() {
        for nt in [
            NodeType::Concept,
            NodeType::Fact,
            NodeType::Insight,
            NodeType::Curiosity,
            NodeType::Project,
            NodeType::Conversation,
            NodeType::Reflection,
        ] {
            assert_eq!(NodeType::parse(nt.as_str()), Some(nt));
        }
        assert_eq!(NodeType::parse("bogus"), None);
    }

    #[test]
    fn test_edge_type_round_trip() {
        for et in [
            EdgeType::RelatedTo,
            EdgeType::LeadsTo,
            EdgeType::Contradicts,
            EdgeType::Supports,
            EdgeType::PartOf,
            EdgeType::DerivedFrom,
            EdgeType::SimilarTo,
        ] {
            assert_eq!(EdgeType::parse(et.as_str()), Some(et));
        }
    }

    #[test]
    fn test_importance_clamped() {
        let node = MemoryNode::new(NodeType::Fact, "water is wet").with_importance(1.7);
        assert!((node.importance - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_access_boosts_importance() {
        let mut node = MemoryNode::new(NodeType::Fact, "x").with_importance(0.5);
        node.record_access();
        assert_eq!(node.access_count, 1);
        assert!(node.importance > 0.5);
    }

    #[test]
    fn test_embedding_text_prefers_summary() {
        let node = MemoryNode::new(NodeType::Insight, "long body").with_summary("short");
        assert_eq!(node.embedding_text(), "short long body");
    }
}
