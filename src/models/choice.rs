//! The append-only choice log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logged decision.
///
/// Choices are append-only and never mutated after creation. They are the
/// sole input to preference detection: the preference engine recomputes its
/// projection from this log rather than treating derived preferences as a
/// source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Unique identifier.
    pub id: String,
    /// What prompted this choice.
    pub context: String,
    /// The options that were presented.
    pub options: Vec<String>,
    /// The option that was chosen.
    pub chosen: String,
    /// Why, if stated.
    pub reasoning: Option<String>,
    /// Domain tag for pattern grouping, e.g. "aesthetic", "social".
    pub domain: String,
    /// The session in which the choice was made.
    pub session_id: String,
    /// When the choice was made.
    pub created_at: DateTime<Utc>,
    /// Set once a successful sleep has folded this choice into Identity.
    ///
    /// Crash-recovery dedup guard: re-running a consolidation that failed
    /// before its atomic identity write sees this still unset.
    pub consolidated: bool,
}

impl Choice {
    /// Creates a new choice record.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        chosen: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            context: String::new(),
            options: Vec::new(),
            chosen: chosen.into(),
            reasoning: None,
            domain: domain.into(),
            session_id: session_id.into(),
            created_at: Utc::now(),
            consolidated: false,
        }
    }

    /// Sets the context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Sets the presented options.
    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Sets the reasoning.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_choice_unconsolidated() {
        let c = Choice::new("aesthetic", "blue", "s1");
        assert!(!c.consolidated);
        assert_eq!(c.domain, "aesthetic");
        assert_eq!(c.chosen, "blue");
    }
}
