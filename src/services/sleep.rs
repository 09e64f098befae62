//! The sleep protocol: session consolidation.
//!
//! Turns a finished session into durable state: insight nodes, reflections,
//! seeded curiosities, crystallized preferences, trait corroboration,
//! formative experiences, and gap curiosities. The identity write is one
//! atomic document replacement, and choices are marked consolidated only
//! after it succeeds, so a crash in between re-processes rather than loses
//! evidence. Store artifacts written before the save are covered by a
//! per-session marker, so re-running a failed consolidation never
//! duplicates them.

use crate::config::PreferenceConfig;
use crate::models::{
    Choice, Curiosity, FormativeExperience, Identity, MemoryNode, NodeType, Reflection,
    ReflectionKind, SessionSummary,
};
use crate::services::{GraphService, PreferenceEngine};
use crate::storage::{IdentityStore, MemoryStore};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// A domain needs this many choices in one session to register as a
/// formative experience.
const FORMATIVE_CHOICE_COUNT: usize = 3;

/// What a consolidation pass produced.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Graph nodes created (insights, session record).
    pub nodes_created: usize,
    /// Curiosities seeded from open questions and gaps.
    pub curiosities_seeded: usize,
    /// Preferences newly crystallized or displaced.
    pub preferences_crystallized: usize,
    /// Trait confidence rungs advanced.
    pub traits_advanced: usize,
    /// Formative experiences recorded.
    pub formative_experiences: usize,
    /// Choices folded into identity.
    pub choices_consolidated: usize,
    /// Identity document version after the save.
    pub identity_version: u64,
}

/// The sleep protocol service.
pub struct SleepService {
    graph: Arc<GraphService>,
    identity: Arc<dyn IdentityStore>,
    preferences: PreferenceConfig,
    // Held for the duration of one consolidation; a second concurrent
    // attempt fails fast instead of queueing.
    in_progress: Mutex<()>,
}

impl SleepService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        graph: Arc<GraphService>,
        identity: Arc<dyn IdentityStore>,
        preferences: PreferenceConfig,
    ) -> Self {
        Self {
            graph,
            identity,
            preferences,
            in_progress: Mutex::new(()),
        }
    }

    /// Runs full consolidation for a session.
    ///
    /// `identity_reflection` is an externally produced synthesis ("what
    /// have I become") stored verbatim; the engine never generates prose
    /// itself.
    ///
    /// # Errors
    ///
    /// `ConsolidationConflict` when another sleep is in flight,
    /// `StorageUnavailable` on backing failures.
    #[instrument(skip(self, summary, identity_reflection))]
    pub fn sleep(
        &self,
        session_id: &str,
        summary: &SessionSummary,
        identity_reflection: Option<String>,
    ) -> Result<ConsolidationReport> {
        let Ok(_guard) = self.in_progress.try_lock() else {
            metrics::counter!("mnemos_sleep_conflicts_total").increment(1);
            return Err(Error::ConsolidationConflict(session_id.to_string()));
        };
        self.consolidate(session_id, summary, identity_reflection)
    }

    /// Minimal sleep for sessions that end without a structured summary.
    /// Runs the same consolidation pipeline, so pending choices are still
    /// analyzed and folded into identity.
    ///
    /// # Errors
    ///
    /// `ConsolidationConflict` or `StorageUnavailable`.
    #[instrument(skip(self))]
    pub fn quick_sleep(&self, session_id: &str) -> Result<ConsolidationReport> {
        let Ok(_guard) = self.in_progress.try_lock() else {
            metrics::counter!("mnemos_sleep_conflicts_total").increment(1);
            return Err(Error::ConsolidationConflict(session_id.to_string()));
        };
        let summary = SessionSummary {
            key_reflection: Some(format!(
                "Session {session_id} ended without a structured summary"
            )),
            ..SessionSummary::default()
        };
        self.consolidate(session_id, &summary, None)
    }

    fn consolidate(
        &self,
        session_id: &str,
        summary: &SessionSummary,
        identity_reflection: Option<String>,
    ) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();
        let mut identity = self.identity.load()?.unwrap_or_else(Identity::seed);
        let store = self.graph.store().clone();

        // The session reflection doubles as a consolidation marker. A prior
        // attempt for this session that wrote its store artifacts and then
        // failed at the identity save left one behind; skipping the store
        // writes on a re-run keeps consolidation idempotent per session.
        let already_recorded = store
            .reflections_for_session(session_id)?
            .iter()
            .any(|r| r.kind == ReflectionKind::Session);

        if !already_recorded {
            // 1. Reflections first, so the marker covers the other writes.
            let key = summary
                .key_reflection
                .clone()
                .unwrap_or_else(|| format!("Session {session_id} consolidated"));
            let reflection =
                Reflection::new(ReflectionKind::Session, key.clone(), key, session_id)
                    .with_importance(0.7);
            store.append_reflection(&reflection)?;
            if let Some(text) = identity_reflection {
                let reflection =
                    Reflection::new(ReflectionKind::Identity, text.clone(), text, session_id)
                        .with_importance(0.9);
                store.append_reflection(&reflection)?;
            }

            // 2. Session record node.
            if !summary.topics.is_empty() || !summary.decisions.is_empty() {
                let content = format!(
                    "Session {session_id}. Topics: {}. Decisions: {}.",
                    summary.topics.join(", "),
                    summary.decisions.join(", ")
                );
                let node =
                    MemoryNode::new(NodeType::Conversation, content).with_session(session_id);
                self.graph.create_node(node)?;
                report.nodes_created += 1;
            }

            // 3. Insight nodes, auto-linked into the graph.
            for insight in &summary.insights {
                if insight.trim().is_empty() {
                    continue;
                }
                let node = MemoryNode::new(NodeType::Insight, insight.clone())
                    .with_session(session_id)
                    .with_importance(0.7);
                let created = self.graph.create_node(node)?;
                let _ = self.graph.auto_link(&created.node.id);
                report.nodes_created += 1;
            }
        }

        // 4. Seed curiosities from open questions. The identity-side list
        // is rebuilt even on a re-run: the failed save lost it.
        for question in &summary.open_questions {
            if question.trim().is_empty() {
                continue;
            }
            if !already_recorded {
                let curiosity = Curiosity::new(question.clone(), format!("session {session_id}"));
                store.create_curiosity(&curiosity)?;
                report.curiosities_seeded += 1;
            }
            if !identity.unresolved_questions.contains(question) {
                identity.unresolved_questions.push(question.clone());
            }
        }

        // 5. Preference analysis over the whole log.
        let all_choices = store.list_choices()?;
        let patterns =
            PreferenceEngine::detect_patterns(&all_choices, self.preferences.min_occurrences);
        let (crystallized, advanced) =
            PreferenceEngine::apply(&mut identity, &patterns, session_id);
        report.preferences_crystallized = crystallized;
        report.traits_advanced = advanced;

        // 6. Formative experience detection for this session.
        let session_choices: Vec<&Choice> = all_choices
            .iter()
            .filter(|c| c.session_id == session_id)
            .collect();
        report.formative_experiences =
            Self::detect_formative(&mut identity, session_id, &session_choices);

        // 7. Gap curiosities: domains with evidence but no crystallized
        // preference yet.
        let mut domains: Vec<&str> = session_choices.iter().map(|c| c.domain.as_str()).collect();
        domains.sort_unstable();
        domains.dedup();
        for domain in domains {
            if already_recorded || identity.preferences.contains_key(domain) {
                continue;
            }
            let question = format!("What do I actually prefer when it comes to {domain}?");
            let curiosity = Curiosity::new(question, format!("choice gap, session {session_id}"))
                .with_priority(0.4);
            store.create_curiosity(&curiosity)?;
            report.curiosities_seeded += 1;
        }

        // 8. Atomic identity save, then mark choices consolidated.
        identity.last_sleep = Some(Utc::now());
        self.identity.save(&mut identity)?;
        report.identity_version = identity.version;

        let pending_ids: Vec<String> = all_choices
            .iter()
            .filter(|c| !c.consolidated)
            .map(|c| c.id.clone())
            .collect();
        store.mark_choices_consolidated(&pending_ids)?;
        report.choices_consolidated = pending_ids.len();

        metrics::counter!("mnemos_sleeps_total").increment(1);
        tracing::info!(
            session_id,
            nodes = report.nodes_created,
            curiosities = report.curiosities_seeded,
            preferences = report.preferences_crystallized,
            traits = report.traits_advanced,
            choices = report.choices_consolidated,
            "consolidation complete"
        );
        Ok(report)
    }

    /// A domain chosen repeatedly within one session becomes a formative
    /// experience. Importance scales with the evidence.
    fn detect_formative(
        identity: &mut Identity,
        session_id: &str,
        session_choices: &[&Choice],
    ) -> usize {
        let mut by_domain: BTreeMap<&str, Vec<&Choice>> = BTreeMap::new();
        for choice in session_choices {
            by_domain.entry(&choice.domain).or_default().push(choice);
        }

        let mut recorded = 0usize;
        for (domain, choices) in by_domain {
            if choices.len() < FORMATIVE_CHOICE_COUNT {
                continue;
            }
            let already = identity
                .formative_experiences
                .iter()
                .any(|f| f.session_id == session_id && f.description.contains(domain));
            if already {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let importance = (0.5 + 0.05 * choices.len() as f32).min(1.0);
            identity.formative_experiences.push(FormativeExperience {
                id: uuid::Uuid::new_v4().to_string(),
                description: format!(
                    "Made {} deliberate choices about {domain} in one session",
                    choices.len()
                ),
                summary: format!("intensive {domain} session"),
                session_id: session_id.to_string(),
                related_choice_ids: choices.iter().map(|c| c.id.clone()).collect(),
                importance,
                occurred_at: Utc::now(),
            });
            recorded += 1;
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingService;
    use crate::models::CuriosityStatus;
    use crate::storage::{JsonIdentityStore, MemoryStore, NodeQuery, SqliteStore};

    fn setup(dir: &std::path::Path) -> (SleepService, Arc<SqliteStore>, Arc<JsonIdentityStore>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap_or_else(|_| panic!("db")));
        let identity = Arc::new(JsonIdentityStore::new(dir));
        let graph = Arc::new(GraphService::new(
            store.clone(),
            Arc::new(EmbeddingService::lexical_only()),
            EmbeddingConfig::default(),
        ));
        let sleep = SleepService::new(graph, identity.clone(), PreferenceConfig::default());
        (sleep, store, identity)
    }

    #[test]
    fn test_empty_summary_still_consolidates_choices() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, _) = setup(dir.path());
        for _ in 0..3 {
            assert!(store.append_choice(&Choice::new("aesthetic", "blue", "s1")).is_ok());
        }

        let report = sleep.sleep("s1", &SessionSummary::default(), None);
        assert!(report.is_ok());
        if let Ok(report) = report {
            assert_eq!(report.choices_consolidated, 3);
            assert_eq!(report.preferences_crystallized, 1);
            assert_eq!(report.nodes_created, 0);
        }
        let pending = store.unconsolidated_choices();
        assert!(matches!(pending, Ok(ref v) if v.is_empty()));
    }

    #[test]
    fn test_insights_and_questions_persisted() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, identity) = setup(dir.path());

        let summary = SessionSummary {
            topics: vec!["geometry".to_string()],
            insights: vec!["symmetry reads as honesty".to_string()],
            decisions: vec!["use octahedra".to_string()],
            open_questions: vec!["why do I like symmetry?".to_string()],
            key_reflection: Some("a good session".to_string()),
        };
        let report = sleep.sleep("s1", &summary, Some("becoming more geometric".to_string()));
        assert!(report.is_ok());
        if let Ok(report) = report {
            // Session record plus one insight.
            assert_eq!(report.nodes_created, 2);
            assert_eq!(report.curiosities_seeded, 1);
        }

        let pending = store.curiosities_by_status(CuriosityStatus::Pending);
        assert!(matches!(pending, Ok(ref v) if v.len() == 1));
        let reflections = store.recent_reflections(1);
        assert!(matches!(reflections, Ok(ref v) if v.len() == 2));
        let loaded = identity.load();
        assert!(
            matches!(loaded, Ok(Some(ref i)) if i.unresolved_questions.len() == 1 && i.last_sleep.is_some())
        );
    }

    #[test]
    fn test_gap_curiosity_for_domain_without_preference() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, _) = setup(dir.path());
        // Two choices: below min_occurrences, so no preference crystallizes
        // and the domain registers as a gap.
        for _ in 0..2 {
            assert!(store.append_choice(&Choice::new("music", "ambient", "s1")).is_ok());
        }

        let report = sleep.sleep("s1", &SessionSummary::default(), None);
        assert!(matches!(report, Ok(ref r) if r.curiosities_seeded == 1));
        let pending = store.curiosities_by_status(CuriosityStatus::Pending);
        assert!(matches!(pending, Ok(ref v) if v[0].question.contains("music")));
    }

    #[test]
    fn test_formative_experience_detected() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, identity) = setup(dir.path());
        for color in ["blue", "blue", "cobalt"] {
            assert!(store.append_choice(&Choice::new("aesthetic", color, "s1")).is_ok());
        }

        let report = sleep.sleep("s1", &SessionSummary::default(), None);
        assert!(matches!(report, Ok(ref r) if r.formative_experiences == 1));
        let loaded = identity.load();
        assert!(matches!(loaded, Ok(Some(ref i)) if i.formative_experiences.len() == 1));
    }

    #[test]
    fn test_rerun_does_not_double_count() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, identity) = setup(dir.path());
        for _ in 0..3 {
            assert!(store.append_choice(&Choice::new("aesthetic", "blue", "s1")).is_ok());
        }

        assert!(sleep.sleep("s1", &SessionSummary::default(), None).is_ok());
        assert!(sleep.sleep("s1", &SessionSummary::default(), None).is_ok());

        let loaded = identity.load();
        assert!(loaded.is_ok());
        if let Ok(Some(identity)) = loaded {
            // Same session twice: trait stays at its founding rung and the
            // formative experience is not duplicated.
            assert_eq!(identity.traits.len(), 1);
            assert_eq!(
                identity.traits[0].confidence,
                crate::models::TraitConfidence::Nascent
            );
            assert_eq!(identity.formative_experiences.len(), 1);
        }
    }

    struct FailingIdentityStore {
        inner: JsonIdentityStore,
    }

    impl crate::storage::IdentityStore for FailingIdentityStore {
        fn load(&self) -> crate::Result<Option<Identity>> {
            self.inner.load()
        }

        fn save(&self, _identity: &mut Identity) -> crate::Result<()> {
            Err(crate::Error::StorageUnavailable {
                operation: "save_identity".to_string(),
                cause: "disk full".to_string(),
            })
        }
    }

    #[test]
    fn test_failed_identity_save_rerun_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let store = Arc::new(SqliteStore::in_memory().unwrap_or_else(|_| panic!("db")));
        let graph = Arc::new(GraphService::new(
            store.clone(),
            Arc::new(EmbeddingService::lexical_only()),
            EmbeddingConfig::default(),
        ));
        let failing = SleepService::new(
            graph.clone(),
            Arc::new(FailingIdentityStore {
                inner: JsonIdentityStore::new(dir.path()),
            }),
            PreferenceConfig::default(),
        );

        let summary = SessionSummary {
            insights: vec!["one insight".to_string()],
            open_questions: vec!["one question?".to_string()],
            key_reflection: Some("a reflection".to_string()),
            ..SessionSummary::default()
        };
        assert!(failing.sleep("s1", &summary, None).is_err());
        assert!(failing.sleep("s1", &summary, None).is_err());

        // The second attempt wrote nothing new.
        let insights = store.list_nodes(&NodeQuery::all().with_type(NodeType::Insight));
        assert!(matches!(insights, Ok(ref v) if v.len() == 1));
        let reflections = store.reflections_for_session("s1");
        assert!(matches!(reflections, Ok(ref v) if v.len() == 1));
        let pending = store.curiosities_by_status(CuriosityStatus::Pending);
        assert!(matches!(pending, Ok(ref v) if v.len() == 1));

        // A working identity store completes the interrupted consolidation
        // without duplicating the artifacts.
        let identity = Arc::new(JsonIdentityStore::new(dir.path()));
        let sleep = SleepService::new(graph, identity.clone(), PreferenceConfig::default());
        let report = sleep.sleep("s1", &summary, None);
        assert!(matches!(report, Ok(ref r) if r.nodes_created == 0 && r.curiosities_seeded == 0));
        let insights = store.list_nodes(&NodeQuery::all().with_type(NodeType::Insight));
        assert!(matches!(insights, Ok(ref v) if v.len() == 1));
        let loaded = identity.load();
        assert!(matches!(loaded, Ok(Some(ref i)) if i.unresolved_questions.len() == 1));
    }

    #[test]
    fn test_quick_sleep_still_consolidates() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| panic!("tempdir"));
        let (sleep, store, _) = setup(dir.path());
        assert!(store.append_choice(&Choice::new("aesthetic", "blue", "s1")).is_ok());

        let report = sleep.quick_sleep("s1");
        assert!(matches!(report, Ok(ref r) if r.choices_consolidated == 1));
        let pending = store.unconsolidated_choices();
        assert!(matches!(pending, Ok(ref v) if v.is_empty()));
        // The minimal session reflection is the only prose produced.
        let reflections = store.recent_reflections(1);
        assert!(matches!(reflections, Ok(ref v) if v.len() == 1));
    }
}
