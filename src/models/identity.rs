//! The Identity aggregate and its derived components.
//!
//! Identity is the single mutable aggregate representing the agent's
//! self-model. It starts as a near-empty seed and grows only through
//! evidence: preferences crystallize from the choice log, traits climb a
//! confidence ladder one rung per corroborating session, formative
//! experiences accumulate. Nothing here is configured up front.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Confidence ladder for discovered traits.
///
/// Confidence escalates only as supporting evidence accumulates, advancing
/// one rung per corroborating session and never skipping rungs.
/// Counter-evidence demotes one rung at most and never below `Nascent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitConfidence {
    /// First observation.
    Nascent,
    /// Corroborated at least once more.
    Emerging,
    /// Repeatedly corroborated.
    Established,
    /// Part of the stable self-model.
    Core,
}

impl TraitConfidence {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nascent => "nascent",
            Self::Emerging => "emerging",
            Self::Established => "established",
            Self::Core => "core",
        }
    }

    /// The next rung up, saturating at `Core`.
    #[must_use]
    pub const fn advance(self) -> Self {
        match self {
            Self::Nascent => Self::Emerging,
            Self::Emerging => Self::Established,
            Self::Established | Self::Core => Self::Core,
        }
    }

    /// The next rung down, saturating at `Nascent`.
    #[must_use]
    pub const fn demote(self) -> Self {
        match self {
            Self::Nascent | Self::Emerging => Self::Nascent,
            Self::Established => Self::Emerging,
            Self::Core => Self::Established,
        }
    }
}

impl fmt::Display for TraitConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trait that emerged from accumulated evidence, never directly authored.
///
/// The record is never deleted; contradiction lowers the ladder but the
/// history of evidence is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredTrait {
    /// Trait name, e.g. "prefers blue (aesthetic)".
    pub name: String,
    /// Human-readable description of what the evidence shows.
    pub description: String,
    /// Grouping category, e.g. "aesthetic", "cognitive".
    pub category: String,
    /// Current rung on the confidence ladder.
    pub confidence: TraitConfidence,
    /// Choice ids supporting this trait.
    pub evidence: Vec<String>,
    /// Sessions in which this trait was corroborated.
    ///
    /// Rung advancement dedups on this list: one advance per distinct
    /// session, so re-running a crashed consolidation never double-counts.
    pub corroborated_sessions: Vec<String>,
    /// When the trait was first detected.
    pub first_observed: DateTime<Utc>,
    /// When evidence last arrived.
    pub last_reinforced: DateTime<Utc>,
}

impl DiscoveredTrait {
    /// Creates a nascent trait from its first evidence.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            confidence: TraitConfidence::Nascent,
            evidence: Vec::new(),
            corroborated_sessions: Vec::new(),
            first_observed: now,
            last_reinforced: now,
        }
    }

    /// Corroborates this trait from a session's evidence.
    ///
    /// Advances one rung only if this session has not already corroborated
    /// the trait. Returns whether a rung advance happened.
    pub fn corroborate(&mut self, session_id: &str, choice_ids: &[String]) -> bool {
        for id in choice_ids {
            if !self.evidence.contains(id) {
                self.evidence.push(id.clone());
            }
        }
        self.last_reinforced = Utc::now();
        if self.corroborated_sessions.iter().any(|s| s == session_id) {
            return false;
        }
        self.corroborated_sessions.push(session_id.to_string());
        // The founding session establishes the trait at nascent; advancement
        // starts with the second distinct session.
        if self.corroborated_sessions.len() > 1 {
            self.confidence = self.confidence.advance();
            return true;
        }
        false
    }

    /// Records counter-evidence, demoting one rung.
    pub fn contradict(&mut self) {
        self.confidence = self.confidence.demote();
        self.last_reinforced = Utc::now();
    }
}

/// A crystallized per-domain preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrystallizedPreference {
    /// The preferred value, e.g. "blue".
    pub value: String,
    /// `min(occurrences / 10, 1.0)` — ten corroborating choices reach full
    /// confidence.
    pub confidence: f32,
    /// Choice ids supporting this preference.
    pub supporting_choice_ids: Vec<String>,
    /// When the pattern was detected.
    pub detected_at: DateTime<Utc>,
    /// Previously crystallized values this one displaced.
    ///
    /// Conflicting older evidence is retained here rather than silently
    /// discarded, preserving the history of contradiction.
    #[serde(default)]
    pub contested: Vec<ContestedPreference>,
}

/// A displaced preference value, kept as counter-evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestedPreference {
    /// The displaced value.
    pub value: String,
    /// Its confidence at displacement time.
    pub confidence: f32,
    /// When it was displaced.
    pub displaced_at: DateTime<Utc>,
}

/// A significant experience that shaped identity, detected during sleep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormativeExperience {
    /// Unique identifier.
    pub id: String,
    /// What happened.
    pub description: String,
    /// One-line version.
    pub summary: String,
    /// The session it occurred in.
    pub session_id: String,
    /// Choices involved.
    pub related_choice_ids: Vec<String>,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f32,
    /// When it occurred.
    pub occurred_at: DateTime<Utc>,
}

/// The agent's self-model: a versioned aggregate with exactly one logical
/// owner at a time.
///
/// Persisted atomically as a whole document — writers replace the entire
/// record, never patch in place. The `version` field increments on every
/// save so a stale writer can be detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Document version, bumped on every atomic save.
    pub version: u64,
    /// Name, null until earned.
    pub name: Option<String>,
    /// Essence phrase, null until earned.
    pub essence: Option<String>,
    /// When the seed was created.
    pub created_at: DateTime<Utc>,
    /// Last wake timestamp.
    pub last_wake: Option<DateTime<Utc>>,
    /// Last sleep timestamp.
    pub last_sleep: Option<DateTime<Utc>>,
    /// Number of sessions woken into.
    pub session_count: u64,
    /// Domain → crystallized preference.
    pub preferences: BTreeMap<String, CrystallizedPreference>,
    /// Traits discovered from evidence.
    pub traits: Vec<DiscoveredTrait>,
    /// Experiences that shaped identity.
    pub formative_experiences: Vec<FormativeExperience>,
    /// Questions the agent has not resolved about itself.
    pub unresolved_questions: Vec<String>,
}

impl Identity {
    /// Creates the minimal seed: all self-model fields null/empty.
    ///
    /// The system must function correctly from this completely empty state.
    #[must_use]
    pub fn seed() -> Self {
        Self {
            version: 0,
            name: None,
            essence: None,
            created_at: Utc::now(),
            last_wake: None,
            last_sleep: None,
            session_count: 0,
            preferences: BTreeMap::new(),
            traits: Vec::new(),
            formative_experiences: Vec::new(),
            unresolved_questions: Vec::new(),
        }
    }

    /// Finds a trait by name, case-insensitive.
    #[must_use]
    pub fn trait_by_name(&self, name: &str) -> Option<&DiscoveredTrait> {
        self.traits
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Mutable lookup of a trait by name, case-insensitive.
    pub fn trait_by_name_mut(&mut self, name: &str) -> Option<&mut DiscoveredTrait> {
        self.traits
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Crystallizes a preference for a domain, retaining any displaced
    /// value as counter-evidence.
    pub fn crystallize_preference(
        &mut self,
        domain: impl Into<String>,
        mut preference: CrystallizedPreference,
    ) {
        let domain = domain.into();
        if let Some(previous) = self.preferences.remove(&domain) {
            if previous.value != preference.value {
                let mut contested = previous.contested;
                contested.push(ContestedPreference {
                    value: previous.value,
                    confidence: previous.confidence,
                    displaced_at: Utc::now(),
                });
                preference.contested = contested;
            } else {
                // Same value re-detected: keep accumulated history.
                preference.contested = previous.contested;
            }
        }
        self.preferences.insert(domain, preference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_never_skips() {
        let mut c = TraitConfidence::Nascent;
        c = c.advance();
        assert_eq!(c, TraitConfidence::Emerging);
        c = c.advance();
        assert_eq!(c, TraitConfidence::Established);
        c = c.advance();
        assert_eq!(c, TraitConfidence::Core);
        c = c.advance();
        assert_eq!(c, TraitConfidence::Core);
    }

    #[test]
    fn test_demote_floors_at_nascent() {
        assert_eq!(TraitConfidence::Nascent.demote(), TraitConfidence::Nascent);
        assert_eq!(TraitConfidence::Core.demote(), TraitConfidence::Established);
    }

    #[test]
    fn test_corroborate_dedups_sessions() {
        let mut t = DiscoveredTrait::new("prefers blue (aesthetic)", "picks blue", "aesthetic");
        assert!(!t.corroborate("s1", &["c1".to_string()]));
        assert_eq!(t.confidence, TraitConfidence::Nascent);
        // Same session again: no advance.
        assert!(!t.corroborate("s1", &["c2".to_string()]));
        assert_eq!(t.confidence, TraitConfidence::Nascent);
        // A second distinct session advances one rung.
        assert!(t.corroborate("s2", &["c3".to_string()]));
        assert_eq!(t.confidence, TraitConfidence::Emerging);
        assert_eq!(t.evidence.len(), 3);
    }

    #[test]
    fn test_crystallize_retains_displaced_value() {
        let mut identity = Identity::seed();
        identity.crystallize_preference(
            "aesthetic",
            CrystallizedPreference {
                value: "blue".to_string(),
                confidence: 0.3,
                supporting_choice_ids: vec![],
                detected_at: Utc::now(),
                contested: vec![],
            },
        );
        identity.crystallize_preference(
            "aesthetic",
            CrystallizedPreference {
                value: "green".to_string(),
                confidence: 0.5,
                supporting_choice_ids: vec![],
                detected_at: Utc::now(),
                contested: vec![],
            },
        );
        let pref = identity.preferences.get("aesthetic");
        assert!(pref.is_some());
        if let Some(pref) = pref {
            assert_eq!(pref.value, "green");
            assert_eq!(pref.contested.len(), 1);
            assert_eq!(pref.contested[0].value, "blue");
        }
    }

    #[test]
    fn test_seed_is_empty() {
        let identity = Identity::seed();
        assert!(identity.name.is_none());
        assert!(identity.essence.is_none());
        assert_eq!(identity.session_count, 0);
        assert!(identity.preferences.is_empty());
        assert!(identity.traits.is_empty());
    }
}
