//! The autonomous explorer.
//!
//! A background loop that picks a pending curiosity (weighted by priority
//! with a little jitter so low-priority questions still get turns),
//! delegates the actual thinking to an [`ExplorationProvider`], and folds
//! the outcome back into the graph. Failures are contained per cycle; a
//! curiosity whose exploration fails returns to pending and is never
//! abandoned automatically.

use crate::config::ExplorerConfig;
use crate::models::{Choice, Curiosity, CuriosityStatus, MemoryNode, NodeType};
use crate::services::GraphService;
use crate::storage::MemoryStore;
use crate::{Error, Result};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::instrument;

/// What an exploration produced.
#[derive(Debug, Clone, Default)]
pub struct ExplorationOutcome {
    /// One-line account of what was explored.
    pub summary: String,
    /// Insights worth persisting as graph nodes.
    pub insights: Vec<String>,
    /// Choices made while exploring, appended to the choice log.
    pub choices: Vec<ExplorationChoice>,
    /// New questions the exploration raised.
    pub follow_ups: Vec<String>,
    /// The conclusion recorded as the curiosity's resolution. `None` means
    /// nothing was learned; the curiosity returns to pending.
    pub conclusion: Option<String>,
}

/// A decision made during exploration.
#[derive(Debug, Clone)]
pub struct ExplorationChoice {
    /// Domain tag for pattern grouping.
    pub domain: String,
    /// The option taken.
    pub chosen: String,
    /// Why, if stated.
    pub reasoning: Option<String>,
}

/// External collaborator that actually explores a curiosity.
///
/// The engine owns lifecycle and persistence; producing thought is someone
/// else's job.
pub trait ExplorationProvider: Send + Sync {
    /// Explores the given curiosity.
    ///
    /// # Errors
    ///
    /// `Exploration` when the collaborator cannot produce an outcome.
    fn explore(&self, curiosity: &Curiosity) -> Result<ExplorationOutcome>;
}

/// Provider that declines every exploration. Useful when no collaborator
/// is wired up; cycles become explicit no-ops.
pub struct NullProvider;

impl ExplorationProvider for NullProvider {
    fn explore(&self, _curiosity: &Curiosity) -> Result<ExplorationOutcome> {
        Err(Error::Exploration("no exploration provider configured".into()))
    }
}

/// Result of one explorer cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// No pending curiosities; explicitly a no-op.
    Idle,
    /// A curiosity was explored to conclusion.
    Explored {
        /// The curiosity that was resolved.
        curiosity_id: String,
        /// Insight nodes persisted.
        nodes_created: usize,
        /// Follow-up curiosities seeded.
        follow_ups: usize,
    },
    /// The exploration produced no conclusion; the curiosity went back to
    /// pending, keeping anything that was learned along the way.
    Inconclusive {
        /// The curiosity that was attempted.
        curiosity_id: String,
        /// Insight nodes persisted anyway.
        nodes_created: usize,
    },
    /// The provider failed; the curiosity went back to pending.
    Failed {
        /// The curiosity that was attempted.
        curiosity_id: String,
        /// What went wrong.
        error: String,
    },
}

/// The autonomous explorer.
pub struct Explorer {
    graph: Arc<GraphService>,
    provider: Arc<dyn ExplorationProvider>,
    config: ExplorerConfig,
}

impl Explorer {
    /// Creates the explorer.
    #[must_use]
    pub fn new(
        graph: Arc<GraphService>,
        provider: Arc<dyn ExplorationProvider>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            graph,
            provider,
            config,
        }
    }

    /// Picks the index of the winning candidate: priority plus uniform
    /// jitter in `[0, jitter_max)`, highest score wins.
    #[must_use]
    pub fn select_index<R: Rng>(
        pending: &[Curiosity],
        jitter_max: f32,
        rng: &mut R,
    ) -> Option<usize> {
        pending
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.priority + rng.gen_range(0.0..jitter_max.max(f32::EPSILON))))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }

    /// Runs one exploration cycle with the given randomness source.
    ///
    /// Provider failure is contained: it is reported in the outcome, the
    /// curiosity returns to pending, and the error does not propagate.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` on backing store failure.
    #[instrument(skip_all)]
    pub fn run_cycle<R: Rng>(&self, rng: &mut R) -> Result<CycleOutcome> {
        let store = self.graph.store();
        let pending = store.curiosities_by_status(CuriosityStatus::Pending)?;
        let Some(index) = Self::select_index(&pending, self.config.jitter_max, rng) else {
            tracing::debug!("no pending curiosities");
            return Ok(CycleOutcome::Idle);
        };
        let Some(mut curiosity) = pending.into_iter().nth(index) else {
            return Ok(CycleOutcome::Idle);
        };

        curiosity.status = CuriosityStatus::Exploring;
        store.update_curiosity(&curiosity)?;
        tracing::info!(id = %curiosity.id, question = %curiosity.question, "exploring");

        match self.provider.explore(&curiosity) {
            Ok(outcome) => self.conclude(curiosity, &outcome),
            Err(e) => {
                // Back to pending; curiosities are never auto-abandoned.
                curiosity.status = CuriosityStatus::Pending;
                store.update_curiosity(&curiosity)?;
                metrics::counter!("mnemos_explorations_failed_total").increment(1);
                tracing::warn!(id = %curiosity.id, error = %e, "exploration failed");
                Ok(CycleOutcome::Failed {
                    curiosity_id: curiosity.id,
                    error: e.to_string(),
                })
            }
        }
    }

    fn conclude(
        &self,
        mut curiosity: Curiosity,
        outcome: &ExplorationOutcome,
    ) -> Result<CycleOutcome> {
        let store = self.graph.store();
        let session_id = format!("exploration-{}", curiosity.id);
        let mut nodes_created = 0usize;

        for insight in &outcome.insights {
            if insight.trim().is_empty() {
                continue;
            }
            let node = MemoryNode::new(NodeType::Insight, insight.clone())
                .with_summary(outcome.summary.clone())
                .with_importance(0.6)
                .with_session(session_id.clone())
                .with_tag(curiosity.id.clone());
            let created = self.graph.create_node(node)?;
            let _ = self.graph.auto_link(&created.node.id);
            curiosity.produced_node_ids.push(created.node.id);
            nodes_created += 1;
        }

        for choice in &outcome.choices {
            let mut record = Choice::new(
                choice.domain.clone(),
                choice.chosen.clone(),
                session_id.clone(),
            )
            .with_context(curiosity.question.clone());
            if let Some(reasoning) = &choice.reasoning {
                record = record.with_reasoning(reasoning.clone());
            }
            store.append_choice(&record)?;
        }

        let mut follow_ups = 0usize;
        for question in outcome.follow_ups.iter().take(self.config.max_follow_ups) {
            if question.trim().is_empty() {
                continue;
            }
            let follow_up = Curiosity::new(
                question.clone(),
                format!("follow-up of: {}", curiosity.question),
            )
            .with_priority((curiosity.priority * 0.8).max(0.1));
            store.create_curiosity(&follow_up)?;
            follow_ups += 1;
        }

        let Some(conclusion) = &outcome.conclusion else {
            curiosity.status = CuriosityStatus::Pending;
            store.update_curiosity(&curiosity)?;
            tracing::info!(id = %curiosity.id, "exploration inconclusive");
            return Ok(CycleOutcome::Inconclusive {
                curiosity_id: curiosity.id,
                nodes_created,
            });
        };

        curiosity.status = CuriosityStatus::Explored;
        curiosity.explored_at = Some(Utc::now());
        curiosity.resolution = Some(conclusion.clone());
        store.update_curiosity(&curiosity)?;

        metrics::counter!("mnemos_explorations_total").increment(1);
        tracing::info!(
            id = %curiosity.id,
            nodes = nodes_created,
            follow_ups,
            "exploration concluded"
        );
        Ok(CycleOutcome::Explored {
            curiosity_id: curiosity.id,
            nodes_created,
            follow_ups,
        })
    }

    /// Runs the explorer loop until shutdown is signalled.
    ///
    /// Each tick runs one cycle on a blocking thread. Cycle errors are
    /// logged and do not stop the loop.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let explorer = Arc::clone(&self);
                    let result = tokio::task::spawn_blocking(move || {
                        let mut rng = rand::thread_rng();
                        explorer.run_cycle(&mut rng)
                    })
                    .await;
                    match result {
                        Ok(Err(e)) => tracing::error!(error = %e, "explorer cycle error"),
                        Err(e) => tracing::error!(error = %e, "explorer task panicked"),
                        Ok(Ok(_)) => {}
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("explorer shutting down");
                        break;
                    }
                }
            }
        }
    }
}
