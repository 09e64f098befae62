//! Storage trait definitions.

use crate::models::{
    Choice, Curiosity, CuriosityStatus, Identity, MemoryEdge, MemoryNode, NodeId, NodeType,
    Reflection,
};
use crate::Result;

/// Sort order for node listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeOrder {
    /// Highest importance first.
    #[default]
    Importance,
    /// Most recently created first.
    Recency,
}

/// Filter and ordering for node listings.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    /// Restrict to a node type.
    pub node_type: Option<NodeType>,
    /// Case-insensitive substring match against content and summary.
    pub text: Option<String>,
    /// Sort order.
    pub order: NodeOrder,
    /// Maximum rows returned.
    pub limit: Option<usize>,
}

impl NodeQuery {
    /// All nodes, importance-first.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a node type.
    #[must_use]
    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    /// Adds a substring filter.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub const fn ordered_by(mut self, order: NodeOrder) -> Self {
        self.order = order;
        self
    }

    /// Bounds the result count.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence for the knowledge graph and its append-mostly logs.
pub trait MemoryStore: Send + Sync {
    /// Persists a new node.
    ///
    /// # Errors
    ///
    /// `Validation` for empty content, `StorageUnavailable` on backend
    /// failure.
    fn create_node(&self, node: &MemoryNode) -> Result<()>;

    /// Fetches a node by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such node exists.
    fn get_node(&self, id: &NodeId) -> Result<MemoryNode>;

    /// Replaces a stored node.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such node exists.
    fn update_node(&self, node: &MemoryNode) -> Result<()>;

    /// Lists nodes matching a query.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<MemoryNode>>;

    /// Total node count.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn count_nodes(&self) -> Result<u64>;

    /// Persists an edge. Both endpoints must already exist.
    ///
    /// # Errors
    ///
    /// `Validation` when an endpoint is missing; nothing is created in that
    /// case.
    fn create_edge(&self, edge: &MemoryEdge) -> Result<()>;

    /// Edges touching a node, in either direction.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn edges_for_node(&self, id: &NodeId) -> Result<Vec<MemoryEdge>>;

    /// Whether any edge connects the two nodes, in either direction.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn edge_exists_between(&self, a: &NodeId, b: &NodeId) -> Result<bool>;

    /// Persists a new curiosity.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty question.
    fn create_curiosity(&self, curiosity: &Curiosity) -> Result<()>;

    /// Fetches a curiosity by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such curiosity exists.
    fn get_curiosity(&self, id: &str) -> Result<Curiosity>;

    /// Curiosities currently in the given status.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn curiosities_by_status(&self, status: CuriosityStatus) -> Result<Vec<Curiosity>>;

    /// Replaces a stored curiosity.
    ///
    /// A status change is validated against the stored row's status; an
    /// illegal transition is rejected and nothing is written.
    ///
    /// # Errors
    ///
    /// `Validation` for an illegal status transition, `NotFound` for a
    /// missing row.
    fn update_curiosity(&self, curiosity: &Curiosity) -> Result<()>;

    /// Appends to the choice log.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty chosen value or domain.
    fn append_choice(&self, choice: &Choice) -> Result<()>;

    /// The full choice log, oldest first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn list_choices(&self) -> Result<Vec<Choice>>;

    /// Choices recorded during one session, oldest first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn choices_for_session(&self, session_id: &str) -> Result<Vec<Choice>>;

    /// Choices not yet folded into identity by a sleep cycle.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn unconsolidated_choices(&self) -> Result<Vec<Choice>>;

    /// Marks choices as consolidated. Called only after the identity save
    /// succeeded, so a crash in between re-processes rather than loses them.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn mark_choices_consolidated(&self, ids: &[String]) -> Result<()>;

    /// Appends a reflection.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn append_reflection(&self, reflection: &Reflection) -> Result<()>;

    /// Reflections created within the last `days` days, newest first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn recent_reflections(&self, days: i64) -> Result<Vec<Reflection>>;

    /// Reflections recorded for one session, oldest first.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backend failure.
    fn reflections_for_session(&self, session_id: &str) -> Result<Vec<Reflection>>;
}

/// Persistence for the identity aggregate.
pub trait IdentityStore: Send + Sync {
    /// Loads the current identity, or `None` when no document exists yet.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on read failure, `Validation` on a corrupt
    /// document.
    fn load(&self) -> Result<Option<Identity>>;

    /// Atomically replaces the identity document, bumping its version.
    ///
    /// The caller's copy is updated with the new version on success.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on write failure.
    fn save(&self, identity: &mut Identity) -> Result<()>;
}
