//! Engine services.
//!
//! Each service owns one protocol: [`GraphService`] the knowledge graph
//! operations, [`WakeService`] context reconstruction at session start,
//! [`SleepService`] consolidation at session end, [`PreferenceEngine`]
//! pattern detection over the choice log, and [`Explorer`] background
//! curiosity resolution.

mod explorer;
mod graph;
mod preferences;
mod sleep;
mod wake;

pub use explorer::{
    CycleOutcome, ExplorationChoice, ExplorationOutcome, ExplorationProvider, Explorer,
    NullProvider,
};
pub use graph::{Cluster, CreateNodeResult, GraphService, SearchHit};
pub use preferences::{PatternKind, PreferenceEngine, PreferencePattern};
pub use sleep::{ConsolidationReport, SleepService};
pub use wake::{WakeContext, WakeService};
