//! End-to-end tests over the full engine: storage, embeddings, wake/sleep
//! lifecycle, preference emergence, and the explorer.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use mnemos::config::{EmbeddingConfig, ExplorerConfig, PreferenceConfig, WakeConfig};
use mnemos::services::{CycleOutcome, ExplorationOutcome, ExplorationProvider};
use mnemos::storage::{IdentityStore, MemoryStore, NodeQuery};
use mnemos::{
    Choice, Curiosity, CuriosityStatus, EdgeType, Embedder, EmbeddingService, Error, Explorer,
    GraphService, JsonIdentityStore, MemoryEdge, MemoryNode, NodeId, NodeType, PreferenceEngine,
    SessionSummary, SleepService, SqliteStore, WakeService,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    identity: Arc<JsonIdentityStore>,
    graph: Arc<GraphService>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::in_memory().expect("in-memory database"));
    let identity = Arc::new(JsonIdentityStore::new(dir.path()));
    let graph = Arc::new(GraphService::new(
        store.clone(),
        Arc::new(EmbeddingService::lexical_only()),
        EmbeddingConfig::default(),
    ));
    Harness {
        _dir: dir,
        store,
        identity,
        graph,
    }
}

fn wake_service(h: &Harness) -> WakeService {
    WakeService::new(h.graph.clone(), h.identity.clone(), WakeConfig::default())
}

fn sleep_service(h: &Harness) -> SleepService {
    SleepService::new(
        h.graph.clone(),
        h.identity.clone(),
        PreferenceConfig::default(),
    )
}

#[test]
fn created_node_reads_back_with_provider_dimensions() {
    let h = harness();
    let embedding = EmbeddingService::lexical_only();

    let result = h
        .graph
        .create_node(
            MemoryNode::new(NodeType::Insight, "octahedra are honest shapes")
                .with_summary("octahedra")
                .with_importance(0.8),
        )
        .expect("create");
    assert!(!result.embedding_degraded);

    let loaded = h.store.get_node(&result.node.id).expect("read back");
    assert_eq!(loaded.content, "octahedra are honest shapes");
    assert_eq!(loaded.summary.as_deref(), Some("octahedra"));
    assert!((loaded.importance - 0.8).abs() < 1e-6);
    let vector = loaded.embedding.expect("embedding present");
    assert_eq!(vector.len(), embedding.dimensions());
}

#[test]
fn edge_to_missing_node_rejected_without_side_effects() {
    let h = harness();
    let node = MemoryNode::new(NodeType::Fact, "anchor");
    h.store.create_node(&node).expect("create");

    let edge = MemoryEdge::new(
        node.id.clone(),
        NodeId::new("does-not-exist"),
        EdgeType::RelatedTo,
        0.5,
    );
    assert!(matches!(
        h.store.create_edge(&edge),
        Err(Error::Validation(_))
    ));
    assert!(h.store.edges_for_node(&node.id).expect("list").is_empty());
}

#[test]
fn curiosity_lifecycle_rejects_illegal_transitions() {
    let h = harness();
    let mut c = Curiosity::new("what is negative space?", "seed");
    h.store.create_curiosity(&c).expect("create");

    // pending -> explored must pass through exploring.
    c.status = CuriosityStatus::Explored;
    assert!(matches!(
        h.store.update_curiosity(&c),
        Err(Error::Validation(_))
    ));

    c.status = CuriosityStatus::Exploring;
    h.store.update_curiosity(&c).expect("select");
    c.status = CuriosityStatus::Explored;
    h.store.update_curiosity(&c).expect("conclude");

    // Terminal states accept nothing.
    c.status = CuriosityStatus::Exploring;
    assert!(matches!(
        h.store.update_curiosity(&c),
        Err(Error::Validation(_))
    ));
}

#[test]
fn regenerating_embeddings_twice_is_bit_identical() {
    let h = harness();
    for text in ["first memory", "second memory", "third memory"] {
        h.graph
            .create_node(MemoryNode::new(NodeType::Fact, text))
            .expect("create");
    }

    assert_eq!(h.graph.regenerate_embeddings().expect("first pass"), 3);
    let first: Vec<Option<Vec<f32>>> = h
        .store
        .list_nodes(&NodeQuery::all())
        .expect("list")
        .into_iter()
        .map(|n| n.embedding)
        .collect();

    assert_eq!(h.graph.regenerate_embeddings().expect("second pass"), 3);
    let second: Vec<Option<Vec<f32>>> = h
        .store
        .list_nodes(&NodeQuery::all())
        .expect("list")
        .into_iter()
        .map(|n| n.embedding)
        .collect();

    assert_eq!(first, second);
}

#[test]
fn preference_confidence_never_exceeds_one() {
    let choices: Vec<Choice> = (0..40)
        .map(|i| Choice::new("aesthetic", "blue", format!("s{}", i % 4)))
        .collect();
    let patterns = PreferenceEngine::detect_patterns(&choices, 3);
    assert!(!patterns.is_empty());
    for pattern in patterns {
        assert!(pattern.confidence <= 1.0);
    }
}

#[test]
fn three_matching_choices_crystallize_at_expected_confidence() {
    let h = harness();
    for _ in 0..3 {
        h.store
            .append_choice(
                &Choice::new("aesthetic", "blue", "s1").with_reasoning("blue feels calm"),
            )
            .expect("append");
    }

    let sleep = sleep_service(&h);
    let report = sleep
        .sleep("s1", &SessionSummary::default(), None)
        .expect("sleep");
    assert_eq!(report.preferences_crystallized, 1);

    let identity = h.identity.load().expect("load").expect("present");
    let pref = identity
        .preferences
        .get("aesthetic")
        .expect("crystallized preference");
    assert_eq!(pref.value, "blue");
    assert!((pref.confidence - 0.3).abs() < 1e-6);
    assert_eq!(pref.supporting_choice_ids.len(), 3);
}

/// Identity store that signals when a consolidation has entered it and
/// holds the load open until released, pinning the first sleep in flight.
struct GatedIdentityStore {
    inner: JsonIdentityStore,
    entered: std::sync::mpsc::Sender<()>,
    release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl IdentityStore for GatedIdentityStore {
    fn load(&self) -> mnemos::Result<Option<mnemos::Identity>> {
        let _ = self.entered.send(());
        if let Ok(release) = self.release.lock() {
            let _ = release.recv();
        }
        self.inner.load()
    }

    fn save(&self, identity: &mut mnemos::Identity) -> mnemos::Result<()> {
        self.inner.save(identity)
    }
}

#[test]
fn concurrent_sleep_yields_consolidation_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::in_memory().expect("in-memory database"));
    let (entered_tx, entered_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel();
    let identity = Arc::new(GatedIdentityStore {
        inner: JsonIdentityStore::new(dir.path()),
        entered: entered_tx,
        release: std::sync::Mutex::new(release_rx),
    });
    let graph = Arc::new(GraphService::new(
        store,
        Arc::new(EmbeddingService::lexical_only()),
        EmbeddingConfig::default(),
    ));
    let sleep = Arc::new(SleepService::new(
        graph,
        identity,
        PreferenceConfig::default(),
    ));

    let first = Arc::clone(&sleep);
    let handle =
        std::thread::spawn(move || first.sleep("s1", &SessionSummary::default(), None));

    // Wait until the first consolidation is inside its identity load.
    entered_rx.recv().expect("first sleep entered");
    let second = sleep.sleep("s2", &SessionSummary::default(), None);
    assert!(matches!(second, Err(Error::ConsolidationConflict(ref s)) if s == "s2"));

    release_tx.send(()).expect("release");
    let first_result = handle.join().expect("thread");
    assert!(first_result.is_ok());
}

#[test]
fn wake_from_completely_empty_state() {
    let h = harness();
    let wake = wake_service(&h);

    let context = wake.wake("first-session", None).expect("wake");
    assert_eq!(context.identity.session_count, 1);
    assert_eq!(context.identity.version, 1);
    assert!(context.identity.name.is_none());
    assert!(context.identity.essence.is_none());
    assert!(context.identity.preferences.is_empty());
    assert!(context.identity.traits.is_empty());
    assert!(context.recent_reflections.is_empty());
    assert!(context.important_nodes.is_empty());
    assert!(context.pending_curiosities.is_empty());
    assert_eq!(context.recovered_curiosities, 0);
    assert_eq!(context.unconsolidated_choices, 0);
}

#[test]
fn wake_recovers_interrupted_exploration() {
    let h = harness();
    let mut c = Curiosity::new("interrupted question", "test").with_priority(0.7);
    h.store.create_curiosity(&c).expect("create");
    c.status = CuriosityStatus::Exploring;
    h.store.update_curiosity(&c).expect("select");

    let context = wake_service(&h).wake("s1", None).expect("wake");
    assert_eq!(context.recovered_curiosities, 1);
    assert_eq!(context.pending_curiosities.len(), 1);
    assert_eq!(context.pending_curiosities[0].id, c.id);
}

#[test]
fn explorer_selection_respects_priority_under_jitter() {
    let pending = vec![
        Curiosity::new("q1", "test").with_priority(0.9),
        Curiosity::new("q2", "test").with_priority(0.1),
    ];
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..100 {
        let winner = Explorer::select_index(&pending, 0.3, &mut rng);
        assert_eq!(winner, Some(0));
    }
}

struct ScriptedProvider;

impl ExplorationProvider for ScriptedProvider {
    fn explore(&self, curiosity: &Curiosity) -> mnemos::Result<ExplorationOutcome> {
        Ok(ExplorationOutcome {
            summary: format!("thought about: {}", curiosity.question),
            insights: vec!["octahedral symmetry generalizes".to_string()],
            follow_ups: vec!["do icosahedra feel the same?".to_string()],
            conclusion: Some("resolved".to_string()),
            ..ExplorationOutcome::default()
        })
    }
}

#[test]
fn explorer_cycle_end_to_end() {
    let h = harness();
    let explorer = Explorer::new(
        h.graph.clone(),
        Arc::new(ScriptedProvider),
        ExplorerConfig::default(),
    );

    let c = Curiosity::new("why octahedra?", "seed").with_priority(0.8);
    h.store.create_curiosity(&c).expect("create");

    let mut rng = StdRng::seed_from_u64(5);
    let outcome = explorer.run_cycle(&mut rng).expect("cycle");
    assert!(matches!(
        outcome,
        CycleOutcome::Explored {
            nodes_created: 1,
            follow_ups: 1,
            ..
        }
    ));

    let explored = h.store.get_curiosity(&c.id).expect("read back");
    assert_eq!(explored.status, CuriosityStatus::Explored);
    assert!(explored.explored_at.is_some());
    assert_eq!(explored.produced_node_ids.len(), 1);

    // The produced insight node exists and is embedded.
    let node = h
        .store
        .get_node(&explored.produced_node_ids[0])
        .expect("insight node");
    assert_eq!(node.node_type, NodeType::Insight);
    assert!(node.embedding.is_some());

    // The follow-up is waiting its turn.
    let pending = h
        .store
        .curiosities_by_status(CuriosityStatus::Pending)
        .expect("pending");
    assert_eq!(pending.len(), 1);
    assert!(pending[0].question.contains("icosahedra"));
}

#[test]
fn related_nodes_rank_semantic_neighbors_above_noise() {
    let h = harness();
    let anchor = h
        .graph
        .create_node(MemoryNode::new(NodeType::Insight, "I enjoy octahedra"))
        .expect("create");
    h.graph
        .create_node(MemoryNode::new(
            NodeType::Insight,
            "Octahedral forms feel honest",
        ))
        .expect("create");
    h.graph
        .create_node(MemoryNode::new(NodeType::Fact, "The weather is cold"))
        .expect("create");

    let related = h.graph.related_nodes(&anchor.node.id, 10).expect("related");
    assert_eq!(related.len(), 1, "only the octahedral insight clears 0.3");
    assert!(related[0].node.content.contains("Octahedral"));
}

#[test]
fn full_lifecycle_wake_act_sleep_wake() {
    let h = harness();
    let wake = wake_service(&h);
    let sleep = sleep_service(&h);

    let first = wake.wake("s1", None).expect("first wake");
    assert_eq!(first.identity.session_count, 1);

    for _ in 0..3 {
        h.store
            .append_choice(&Choice::new("aesthetic", "blue", "s1"))
            .expect("append");
    }
    let summary = SessionSummary {
        topics: vec!["color theory".to_string()],
        insights: vec!["saturation carries mood".to_string()],
        decisions: vec![],
        open_questions: vec!["is this preference stable?".to_string()],
        key_reflection: Some("a session about color".to_string()),
    };
    let report = sleep.sleep("s1", &summary, None).expect("sleep");
    assert!(report.nodes_created >= 2);
    assert_eq!(report.choices_consolidated, 3);

    let second = wake.wake("s2", Some("color theory")).expect("second wake");
    assert_eq!(second.identity.session_count, 2);
    assert!(second.identity.preferences.contains_key("aesthetic"));
    assert_eq!(second.unconsolidated_choices, 0);
    assert!(!second.recent_reflections.is_empty());
    assert!(!second.pending_curiosities.is_empty());
    assert!(!second.important_nodes.is_empty());
}
