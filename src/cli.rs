//! Command-line interface.

use crate::config::EngineConfig;
use crate::embedding::EmbeddingService;
use crate::models::{Choice, Curiosity, CuriosityStatus, MemoryNode, NodeType, SessionSummary};
use crate::observability::{init_tracing, LogFormat};
use crate::services::{
    CycleOutcome, Explorer, GraphService, NullProvider, PreferenceEngine, SleepService,
    WakeService,
};
use crate::storage::{IdentityStore, JsonIdentityStore, MemoryStore, SqliteStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Memory and consolidation engine for a long-running conversational agent.
#[derive(Parser)]
#[command(name = "mnemos", version, about)]
pub struct Cli {
    /// Data directory (overrides configuration)
    #[arg(long, env = "MNEMOS_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, env = "MNEMOS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as line-delimited JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Command {
    /// Reconstruct context at session start
    Wake {
        /// Session identifier
        session_id: String,
        /// Context hint to focus retrieval
        #[arg(long)]
        hint: Option<String>,
    },
    /// Consolidate a finished session
    Sleep {
        /// Session identifier
        session_id: String,
        /// Path to a JSON session summary
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Identity reflection text to store verbatim
        #[arg(long)]
        reflection: Option<String>,
    },
    /// Consolidate a session that ended without a structured summary
    QuickSleep {
        /// Session identifier
        session_id: String,
    },
    /// Store a memory node
    Remember {
        /// Node content
        content: String,
        /// Node type
        #[arg(long, default_value = "fact")]
        node_type: String,
        /// Short summary
        #[arg(long)]
        summary: Option<String>,
        /// Importance in [0.0, 1.0]
        #[arg(long, default_value_t = 0.5)]
        importance: f32,
        /// Owning session
        #[arg(long)]
        session: Option<String>,
    },
    /// Semantic search over the graph
    Search {
        /// Query text
        query: String,
        /// Maximum results
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Curiosity queue operations
    #[command(subcommand)]
    Curiosity(CuriosityCommand),
    /// Log a choice
    Choice {
        /// Domain tag, e.g. "aesthetic"
        domain: String,
        /// The chosen option
        chosen: String,
        /// Session identifier
        #[arg(long)]
        session: String,
        /// Why this option was chosen
        #[arg(long)]
        reasoning: Option<String>,
        /// What prompted the choice
        #[arg(long)]
        context: Option<String>,
    },
    /// Run the autonomous explorer
    Explore {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Detect preference patterns in the choice log
    Analyze,
    /// Re-embed every node with the active provider
    Reindex,
    /// Show engine status
    Status,
}

/// Curiosity subcommands.
#[derive(Subcommand)]
enum CuriosityCommand {
    /// Seed a new curiosity
    Add {
        /// The question to explore
        question: String,
        /// Where it came from
        #[arg(long, default_value = "manual")]
        context: String,
        /// Selection priority in [0.0, 1.0]
        #[arg(long, default_value_t = 0.5)]
        priority: f32,
    },
    /// List curiosities by status
    List {
        /// Status filter
        #[arg(long, default_value = "pending")]
        status: String,
    },
}

struct Engine {
    store: Arc<SqliteStore>,
    identity: Arc<JsonIdentityStore>,
    graph: Arc<GraphService>,
    config: EngineConfig,
}

fn build_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::load_default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir.clone_from(data_dir);
    }

    let store = Arc::new(SqliteStore::new(&config.data_dir.join("graph.db"))?);
    let identity = Arc::new(JsonIdentityStore::new(&config.data_dir));
    let embedding = Arc::new(EmbeddingService::from_config(&config.embedding));
    let graph = Arc::new(GraphService::new(
        store.clone(),
        embedding,
        config.embedding.clone(),
    ));
    Ok(Engine {
        store,
        identity,
        graph,
        config,
    })
}

/// Parses arguments and runs the selected command.
///
/// # Errors
///
/// Returns any engine or I/O error, formatted for the user at the
/// boundary.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing(format, cli.verbose);

    let engine = build_engine(&cli)?;

    match &cli.command {
        Command::Wake { session_id, hint } => {
            let wake = WakeService::new(
                engine.graph.clone(),
                engine.identity.clone(),
                engine.config.wake.clone(),
            );
            let context = wake.wake(session_id, hint.as_deref())?;
            println!(
                "session {} of {} (identity v{}, embeddings: {})",
                context.identity.session_count,
                context.identity.name.as_deref().unwrap_or("<unnamed>"),
                context.identity.version,
                context.embedding_provider
            );
            if context.recovered_curiosities > 0 {
                println!(
                    "recovered {} stale exploration(s)",
                    context.recovered_curiosities
                );
            }
            println!(
                "{} reflection(s), {} important node(s), {} pending curiosit(ies), {} choice(s) awaiting consolidation",
                context.recent_reflections.len(),
                context.important_nodes.len(),
                context.pending_curiosities.len(),
                context.unconsolidated_choices
            );
            for reflection in &context.recent_reflections {
                println!("  [{}] {}", reflection.kind.as_str(), reflection.summary);
            }
            for curiosity in &context.pending_curiosities {
                println!("  ? ({:.2}) {}", curiosity.priority, curiosity.question);
            }
            for hit in &context.hint_matches {
                println!(
                    "  ~ {:.3} {}",
                    hit.similarity,
                    hit.node.summary.as_deref().unwrap_or(&hit.node.content)
                );
            }
        }

        Command::Sleep {
            session_id,
            summary,
            reflection,
        } => {
            let parsed: SessionSummary = match summary {
                Some(path) => {
                    let contents = std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&contents)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => SessionSummary::default(),
            };
            let sleep = SleepService::new(
                engine.graph.clone(),
                engine.identity.clone(),
                engine.config.preferences.clone(),
            );
            let report = sleep.sleep(session_id, &parsed, reflection.clone())?;
            println!(
                "consolidated: {} node(s), {} curiosit(ies), {} preference(s), {} trait advance(s), {} choice(s) (identity v{})",
                report.nodes_created,
                report.curiosities_seeded,
                report.preferences_crystallized,
                report.traits_advanced,
                report.choices_consolidated,
                report.identity_version
            );
        }

        Command::QuickSleep { session_id } => {
            let sleep = SleepService::new(
                engine.graph.clone(),
                engine.identity.clone(),
                engine.config.preferences.clone(),
            );
            let report = sleep.quick_sleep(session_id)?;
            println!(
                "slept: {} choice(s) consolidated (identity v{})",
                report.choices_consolidated, report.identity_version
            );
        }

        Command::Remember {
            content,
            node_type,
            summary,
            importance,
            session,
        } => {
            let node_type = NodeType::parse(node_type)
                .ok_or_else(|| anyhow::anyhow!("unknown node type: {node_type}"))?;
            let mut node = MemoryNode::new(node_type, content.clone()).with_importance(*importance);
            if let Some(summary) = summary {
                node = node.with_summary(summary.clone());
            }
            if let Some(session) = session {
                node = node.with_session(session.clone());
            }
            let result = engine.graph.create_node(node)?;
            let links = engine.graph.auto_link(&result.node.id)?;
            println!(
                "remembered {} ({} auto-link(s){})",
                result.node.id,
                links.len(),
                if result.embedding_degraded {
                    ", embedding degraded"
                } else {
                    ""
                }
            );
        }

        Command::Search { query, limit } => {
            let hits = engine.graph.semantic_search(query, *limit)?;
            for hit in hits {
                println!(
                    "{:.3}  [{}] {}",
                    hit.similarity,
                    hit.node.node_type,
                    hit.node.summary.as_deref().unwrap_or(&hit.node.content)
                );
            }
        }

        Command::Curiosity(command) => match command {
            CuriosityCommand::Add {
                question,
                context,
                priority,
            } => {
                let curiosity =
                    Curiosity::new(question.clone(), context.clone()).with_priority(*priority);
                engine.store.create_curiosity(&curiosity)?;
                println!("seeded {}", curiosity.id);
            }
            CuriosityCommand::List { status } => {
                let status = CuriosityStatus::parse(status)
                    .ok_or_else(|| anyhow::anyhow!("unknown status: {status}"))?;
                for curiosity in engine.store.curiosities_by_status(status)? {
                    println!(
                        "({:.2}) {}  {}",
                        curiosity.priority, curiosity.id, curiosity.question
                    );
                }
            }
        },

        Command::Choice {
            domain,
            chosen,
            session,
            reasoning,
            context,
        } => {
            let mut choice = Choice::new(domain.clone(), chosen.clone(), session.clone());
            if let Some(reasoning) = reasoning {
                choice = choice.with_reasoning(reasoning.clone());
            }
            if let Some(context) = context {
                choice = choice.with_context(context.clone());
            }
            engine.store.append_choice(&choice)?;
            println!("logged {}", choice.id);
        }

        Command::Explore { once } => {
            let explorer = Arc::new(Explorer::new(
                engine.graph.clone(),
                Arc::new(NullProvider),
                engine.config.explorer.clone(),
            ));
            if *once {
                let outcome = tokio::task::spawn_blocking(move || {
                    let mut rng = rand::thread_rng();
                    explorer.run_cycle(&mut rng)
                })
                .await??;
                match outcome {
                    CycleOutcome::Idle => println!("nothing pending"),
                    CycleOutcome::Explored {
                        curiosity_id,
                        nodes_created,
                        follow_ups,
                    } => println!(
                        "explored {curiosity_id}: {nodes_created} node(s), {follow_ups} follow-up(s)"
                    ),
                    CycleOutcome::Inconclusive {
                        curiosity_id,
                        nodes_created,
                    } => println!(
                        "exploration of {curiosity_id} was inconclusive: {nodes_created} node(s), returned to pending"
                    ),
                    CycleOutcome::Failed {
                        curiosity_id,
                        error,
                    } => println!("exploration of {curiosity_id} failed: {error}"),
                }
            } else {
                let (tx, rx) = tokio::sync::watch::channel(false);
                let handle = tokio::spawn(explorer.run(rx));
                tokio::signal::ctrl_c().await?;
                let _ = tx.send(true);
                let _ = handle.await;
            }
        }

        Command::Analyze => {
            let analysis = PreferenceEngine::new(
                engine.store.clone(),
                engine.config.preferences.clone(),
            );
            let patterns = analysis.detect()?;
            if patterns.is_empty() {
                println!("no patterns above threshold");
            }
            for pattern in patterns {
                println!(
                    "{}: '{}' x{} (confidence {:.2}, {} session(s))",
                    pattern.domain,
                    pattern.value,
                    pattern.occurrences,
                    pattern.confidence,
                    pattern.sessions.len()
                );
            }
        }

        Command::Reindex => {
            let updated = engine.graph.regenerate_embeddings()?;
            println!("re-embedded {updated} node(s)");
        }

        Command::Status => {
            let identity = engine.identity.load()?;
            let nodes = engine.store.count_nodes()?;
            let pending = engine
                .store
                .curiosities_by_status(CuriosityStatus::Pending)?
                .len();
            let unconsolidated = engine.store.unconsolidated_choices()?.len();
            match identity {
                Some(identity) => println!(
                    "identity v{}: {} session(s), {} preference(s), {} trait(s)",
                    identity.version,
                    identity.session_count,
                    identity.preferences.len(),
                    identity.traits.len()
                ),
                None => println!("identity: not yet seeded"),
            }
            println!("{nodes} node(s), {pending} pending curiosit(ies), {unconsolidated} unconsolidated choice(s)");
        }
    }

    Ok(())
}
