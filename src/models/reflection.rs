//! Reflections and session summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of reflection a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionKind {
    /// End-of-session narrative.
    Session,
    /// A single important takeaway.
    Insight,
    /// An externally supplied "what have I become" synthesis.
    Identity,
}

impl ReflectionKind {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Insight => "insight",
            Self::Identity => "identity",
        }
    }

    /// Parses from the canonical string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session" => Some(Self::Session),
            "insight" => Some(Self::Insight),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// A stored reflection, read back by the wake protocol's lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// Unique identifier.
    pub id: String,
    /// Kind of reflection.
    pub kind: ReflectionKind,
    /// Full text.
    pub content: String,
    /// Condensed one-liner.
    pub summary: String,
    /// The session that produced it.
    pub session_id: String,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f32,
    /// Tags for retrieval.
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Reflection {
    /// Creates a new reflection.
    #[must_use]
    pub fn new(
        kind: ReflectionKind,
        content: impl Into<String>,
        summary: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content: content.into(),
            summary: summary.into(),
            session_id: session_id.into(),
            importance: 0.5,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sets the importance, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Structured summary of a session, supplied to the sleep protocol by the
/// front-end.
///
/// The engine never parses natural language: anything it should act on
/// (insights to persist, questions to seed as curiosities) arrives here as
/// structured lists, not free text to be mined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Topics discussed.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Insights gained; each is persisted as an `insight` node.
    #[serde(default)]
    pub insights: Vec<String>,
    /// Decisions made.
    #[serde(default)]
    pub decisions: Vec<String>,
    /// New questions; each is seeded as a pending curiosity.
    #[serde(default)]
    pub open_questions: Vec<String>,
    /// The single most important takeaway.
    #[serde(default)]
    pub key_reflection: Option<String>,
}

impl SessionSummary {
    /// Whether the summary carries any content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.insights.is_empty()
            && self.decisions.is_empty()
            && self.open_questions.is_empty()
            && self.key_reflection.is_none()
    }
}
