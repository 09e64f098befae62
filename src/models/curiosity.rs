//! Curiosity lifecycle types.

use crate::models::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a curiosity.
///
/// ```text
/// pending ──> exploring ──> explored   (terminal)
///    ^            │
///    └────────────┼──────── abandoned  (terminal, manual only)
///     (recovery)  │
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CuriosityStatus {
    /// Not yet explored. The initial state.
    Pending,
    /// Currently selected for exploration.
    Exploring,
    /// Exploration yielded a conclusion. Terminal.
    Explored,
    /// Given up on, by explicit administrative action. Terminal.
    Abandoned,
}

impl CuriosityStatus {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Exploring => "exploring",
            Self::Explored => "explored",
            Self::Abandoned => "abandoned",
        }
    }

    /// Parses from the canonical string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "exploring" => Some(Self::Exploring),
            "explored" => Some(Self::Explored),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    /// Whether the transition `self -> to` is legal.
    ///
    /// `exploring -> pending` is the recovery path for explorations that
    /// aborted (crash, timeout). Terminal states accept no transitions.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Exploring)
                | (Self::Exploring, Self::Explored)
                | (Self::Exploring, Self::Pending)
                | (Self::Exploring, Self::Abandoned)
        )
    }
}

impl fmt::Display for CuriosityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open question tracked through an explicit lifecycle.
///
/// Curiosities arise from session consolidation, from exploration fan-out,
/// or as explicit seeds. They drive the autonomous explorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curiosity {
    /// Unique identifier.
    pub id: String,
    /// The question to explore.
    pub question: String,
    /// Where this curiosity came from.
    pub context: String,
    /// Lifecycle state.
    pub status: CuriosityStatus,
    /// Selection priority in `[0.0, 1.0]`.
    pub priority: f32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When exploration concluded, if it has.
    pub explored_at: Option<DateTime<Utc>>,
    /// Conclusion recorded when the curiosity was explored.
    pub resolution: Option<String>,
    /// Nodes produced while exploring this curiosity.
    pub produced_node_ids: Vec<NodeId>,
    /// Opaque metadata map.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Curiosity {
    /// Creates a new pending curiosity.
    #[must_use]
    pub fn new(question: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question: question.into(),
            context: context.into(),
            status: CuriosityStatus::Pending,
            priority: 0.5,
            created_at: Utc::now(),
            explored_at: None,
            resolution: None,
            produced_node_ids: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Sets the priority, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = priority.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CuriosityStatus::Pending, CuriosityStatus::Exploring, true; "select for exploration")]
    #[test_case(CuriosityStatus::Exploring, CuriosityStatus::Explored, true; "conclude")]
    #[test_case(CuriosityStatus::Exploring, CuriosityStatus::Pending, true; "recovery")]
    #[test_case(CuriosityStatus::Exploring, CuriosityStatus::Abandoned, true; "manual abandon")]
    #[test_case(CuriosityStatus::Pending, CuriosityStatus::Explored, false; "no skipping")]
    #[test_case(CuriosityStatus::Pending, CuriosityStatus::Abandoned, false; "no pending abandon")]
    #[test_case(CuriosityStatus::Explored, CuriosityStatus::Pending, false; "explored is terminal")]
    #[test_case(CuriosityStatus::Abandoned, CuriosityStatus::Exploring, false; "abandoned is terminal")]
    fn test_transitions(from: CuriosityStatus, to: CuriosityStatus, legal: bool) {
        assert_eq!(from.can_transition(to), legal);
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            CuriosityStatus::Pending,
            CuriosityStatus::Exploring,
            CuriosityStatus::Explored,
            CuriosityStatus::Abandoned,
        ] {
            assert_eq!(CuriosityStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_new_curiosity_is_pending() {
        let c = Curiosity::new("why do clocks drift?", "seeded");
        assert_eq!(c.status, CuriosityStatus::Pending);
        assert!((c.priority - 0.5).abs() < f32::EPSILON);
    }
}
