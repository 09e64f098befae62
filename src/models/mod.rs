//! Data model types for the memory engine.

mod choice;
mod curiosity;
mod identity;
mod node;
mod reflection;

pub use choice::Choice;
pub use curiosity::{Curiosity, CuriosityStatus};
pub use identity::{
    ContestedPreference, CrystallizedPreference, DiscoveredTrait, FormativeExperience, Identity,
    TraitConfidence,
};
pub use node::{EdgeType, MemoryEdge, MemoryNode, NodeId, NodeType};
pub use reflection::{Reflection, ReflectionKind, SessionSummary};
