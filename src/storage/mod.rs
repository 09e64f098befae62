//! Storage backends.
//!
//! The knowledge graph (nodes, edges, curiosities, choices, reflections)
//! lives behind the [`MemoryStore`] trait, backed by SQLite. The identity
//! aggregate lives behind [`IdentityStore`], backed by a versioned JSON
//! document that is replaced atomically on every save.

mod identity;
mod sqlite;
mod traits;

pub use identity::JsonIdentityStore;
pub use sqlite::SqliteStore;
pub use traits::{IdentityStore, MemoryStore, NodeOrder, NodeQuery};
