//! Preference emergence.
//!
//! Detects recurring patterns in the append-only choice log and folds them
//! into the identity aggregate. The log is the source of truth: detection
//! always recomputes from it, so derived preferences can be rebuilt from
//! scratch at any time.

use crate::config::PreferenceConfig;
use crate::models::{Choice, CrystallizedPreference, DiscoveredTrait, Identity};
use crate::storage::MemoryStore;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ten corroborating choices reach full confidence.
const FULL_CONFIDENCE_COUNT: f32 = 10.0;

/// What kind of evidence a pattern rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// The same value was chosen repeatedly.
    RepeatedChoice,
    /// The same theme recurred in stated reasoning.
    ReasoningTheme,
}

/// A detected candidate preference.
#[derive(Debug, Clone)]
pub struct PreferencePattern {
    /// Domain the pattern belongs to.
    pub domain: String,
    /// The recurring value or theme.
    pub value: String,
    /// How often it recurred.
    pub occurrences: usize,
    /// `min(occurrences / 10, 1.0)`.
    pub confidence: f32,
    /// Ids of the choices carrying the evidence.
    pub supporting_choice_ids: Vec<String>,
    /// Sessions the evidence spans.
    pub sessions: Vec<String>,
    /// Timestamp of the most recent supporting choice.
    pub last_seen: DateTime<Utc>,
    /// Evidence kind.
    pub kind: PatternKind,
}

fn confidence_for(occurrences: usize) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let raw = occurrences as f32 / FULL_CONFIDENCE_COUNT;
    raw.min(1.0)
}

fn reasoning_tokens(reasoning: &str) -> impl Iterator<Item = String> + '_ {
    reasoning
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 4)
        .map(str::to_lowercase)
}

/// Preference pattern detection over the choice log.
pub struct PreferenceEngine {
    store: Arc<dyn MemoryStore>,
    config: PreferenceConfig,
}

impl PreferenceEngine {
    /// Creates the engine.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, config: PreferenceConfig) -> Self {
        Self { store, config }
    }

    /// Detects patterns over the full choice log.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on read failure.
    pub fn detect(&self) -> Result<Vec<PreferencePattern>> {
        let choices = self.store.list_choices()?;
        Ok(Self::detect_patterns(&choices, self.config.min_occurrences))
    }

    /// Pure pattern detection over a slice of choices.
    ///
    /// A value (or a reasoning theme) must recur at least `min_occurrences`
    /// times within one domain to qualify. Confidence grows linearly with
    /// evidence and caps at 1.0.
    #[must_use]
    pub fn detect_patterns(choices: &[Choice], min_occurrences: usize) -> Vec<PreferencePattern> {
        let min_occurrences = min_occurrences.max(1);
        let mut by_domain: BTreeMap<&str, Vec<&Choice>> = BTreeMap::new();
        for choice in choices {
            by_domain.entry(&choice.domain).or_default().push(choice);
        }

        let mut patterns = Vec::new();
        for (domain, domain_choices) in by_domain {
            // Recurring chosen values.
            let mut by_value: BTreeMap<String, Vec<&Choice>> = BTreeMap::new();
            for choice in &domain_choices {
                by_value
                    .entry(choice.chosen.to_lowercase())
                    .or_default()
                    .push(choice);
            }
            for (value, supporters) in by_value {
                if supporters.len() >= min_occurrences {
                    patterns.push(Self::pattern(
                        domain,
                        value,
                        &supporters,
                        PatternKind::RepeatedChoice,
                    ));
                }
            }

            // Recurring reasoning themes.
            let mut by_theme: BTreeMap<String, Vec<&Choice>> = BTreeMap::new();
            for choice in &domain_choices {
                let Some(reasoning) = &choice.reasoning else {
                    continue;
                };
                let mut seen = std::collections::BTreeSet::new();
                for token in reasoning_tokens(reasoning) {
                    // Count a theme once per choice.
                    if seen.insert(token.clone()) {
                        by_theme.entry(token).or_default().push(choice);
                    }
                }
            }
            for (theme, supporters) in by_theme {
                if supporters.len() >= min_occurrences {
                    patterns.push(Self::pattern(
                        domain,
                        theme,
                        &supporters,
                        PatternKind::ReasoningTheme,
                    ));
                }
            }
        }

        patterns.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        patterns
    }

    fn pattern(
        domain: &str,
        value: String,
        supporters: &[&Choice],
        kind: PatternKind,
    ) -> PreferencePattern {
        let mut sessions: Vec<String> = supporters.iter().map(|c| c.session_id.clone()).collect();
        sessions.sort();
        sessions.dedup();
        let last_seen = supporters
            .iter()
            .map(|c| c.created_at)
            .max()
            .unwrap_or_else(Utc::now);
        PreferencePattern {
            domain: domain.to_string(),
            value,
            occurrences: supporters.len(),
            confidence: confidence_for(supporters.len()),
            supporting_choice_ids: supporters.iter().map(|c| c.id.clone()).collect(),
            sessions,
            last_seen,
            kind,
        }
    }

    /// Folds detected patterns into the identity aggregate.
    ///
    /// Per domain, the strongest repeated-choice pattern crystallizes as
    /// the preference (displacing any conflicting older value into the
    /// contested history). Every pattern also corroborates a discovered
    /// trait, advancing its confidence at most one rung per distinct
    /// session.
    ///
    /// Returns `(preferences_crystallized, traits_advanced)`.
    pub fn apply(
        identity: &mut Identity,
        patterns: &[PreferencePattern],
        session_id: &str,
    ) -> (usize, usize) {
        let mut crystallized = 0usize;
        let mut advanced = 0usize;

        // Strongest pattern per domain wins; ties go to the pattern whose
        // latest supporting choice is most recent.
        let mut winners: BTreeMap<&str, &PreferencePattern> = BTreeMap::new();
        for pattern in patterns {
            if pattern.kind != PatternKind::RepeatedChoice {
                continue;
            }
            let entry = winners.entry(&pattern.domain).or_insert(pattern);
            if pattern.occurrences > entry.occurrences
                || (pattern.occurrences == entry.occurrences
                    && pattern.last_seen > entry.last_seen)
            {
                *entry = pattern;
            }
        }

        for (domain, pattern) in winners {
            let replaces = identity
                .preferences
                .get(domain)
                .map_or(true, |existing| existing.value != pattern.value);
            identity.crystallize_preference(
                domain,
                CrystallizedPreference {
                    value: pattern.value.clone(),
                    confidence: pattern.confidence,
                    supporting_choice_ids: pattern.supporting_choice_ids.clone(),
                    detected_at: Utc::now(),
                    contested: Vec::new(),
                },
            );
            if replaces {
                crystallized += 1;
            }
        }

        for pattern in patterns {
            // Only patterns this session actually contributed evidence to
            // may advance the trait; re-detecting old evidence under a new
            // session id is not corroboration.
            if !pattern.sessions.iter().any(|s| s == session_id) {
                continue;
            }
            let name = format!("prefers {} ({})", pattern.value, pattern.domain);
            if identity.trait_by_name(&name).is_none() {
                identity.traits.push(DiscoveredTrait::new(
                    &name,
                    format!(
                        "chose or reasoned toward '{}' {} times in {}",
                        pattern.value, pattern.occurrences, pattern.domain
                    ),
                    pattern.domain.clone(),
                ));
            }
            if let Some(discovered) = identity.trait_by_name_mut(&name) {
                if discovered.corroborate(session_id, &pattern.supporting_choice_ids) {
                    advanced += 1;
                }
            }
        }

        (crystallized, advanced)
    }
}
