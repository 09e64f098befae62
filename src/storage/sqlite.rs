//! SQLite-backed knowledge graph store.

use super::traits::{MemoryStore, NodeOrder, NodeQuery};
use crate::models::{
    Choice, Curiosity, CuriosityStatus, EdgeType, MemoryEdge, MemoryNode, NodeId, NodeType,
    Reflection, ReflectionKind,
};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    session_id TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',
    embedding TEXT,
    access_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
CREATE INDEX IF NOT EXISTS idx_nodes_importance ON nodes(importance DESC);
CREATE INDEX IF NOT EXISTS idx_nodes_created ON nodes(created_at DESC);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0.5,
    description TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

CREATE TABLE IF NOT EXISTS curiosities (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    context TEXT NOT NULL,
    status TEXT NOT NULL,
    priority REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    explored_at TEXT,
    resolution TEXT,
    produced_node_ids TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_curiosities_status ON curiosities(status);

CREATE TABLE IF NOT EXISTS choices (
    id TEXT PRIMARY KEY,
    context TEXT NOT NULL,
    options TEXT NOT NULL DEFAULT '[]',
    chosen TEXT NOT NULL,
    reasoning TEXT,
    domain TEXT NOT NULL,
    session_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    consolidated INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_choices_session ON choices(session_id);
CREATE INDEX IF NOT EXISTS idx_choices_consolidated ON choices(consolidated);

CREATE TABLE IF NOT EXISTS reflections (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    session_id TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reflections_created ON reflections(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reflections_session ON reflections(session_id);
";

/// Knowledge graph persistence over a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn storage_err(operation: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| Error::StorageUnavailable {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn poisoned(operation: &str) -> Error {
    Error::StorageUnavailable {
        operation: operation.to_string(),
        cause: "storage lock poisoned".to_string(),
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn json_or_default<T: Default + serde::de::DeserializeOwned>(s: &str) -> T {
    serde_json::from_str(s).unwrap_or_default()
}

impl SqliteStore {
    /// Opens (creating if needed) a database at the given path.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the database cannot be opened or migrated.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageUnavailable {
                operation: "create_data_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(storage_err("open_database"))?;
        Self::init(conn)
    }

    /// An in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` when the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err("open_database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_err("init_schema"))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(storage_err("init_schema"))?;
        conn.execute_batch(SCHEMA)
            .map_err(storage_err("init_schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self, operation: &str) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned(operation))
    }
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<MemoryNode> {
    let id: String = row.get("id")?;
    let node_type: String = row.get("node_type")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let metadata: String = row.get("metadata")?;
    let tags: String = row.get("tags")?;
    let embedding: Option<String> = row.get("embedding")?;

    Ok(MemoryNode {
        id: NodeId::new(id),
        node_type: NodeType::parse(&node_type).unwrap_or(NodeType::Fact),
        content: row.get("content")?,
        summary: row.get("summary")?,
        importance: row.get("importance")?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        session_id: row.get("session_id")?,
        metadata: json_or_default(&metadata),
        tags: json_or_default(&tags),
        embedding: embedding.map(|s| json_or_default(&s)),
        access_count: row.get("access_count")?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<MemoryEdge> {
    let source_id: String = row.get("source_id")?;
    let target_id: String = row.get("target_id")?;
    let edge_type: String = row.get("edge_type")?;
    let created_at: String = row.get("created_at")?;

    Ok(MemoryEdge {
        id: row.get("id")?,
        source_id: NodeId::new(source_id),
        target_id: NodeId::new(target_id),
        edge_type: EdgeType::parse(&edge_type).unwrap_or(EdgeType::RelatedTo),
        weight: row.get("weight")?,
        description: row.get("description")?,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_curiosity(row: &Row<'_>) -> rusqlite::Result<Curiosity> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let explored_at: Option<String> = row.get("explored_at")?;
    let produced: String = row.get("produced_node_ids")?;
    let metadata: String = row.get("metadata")?;

    Ok(Curiosity {
        id: row.get("id")?,
        question: row.get("question")?,
        context: row.get("context")?,
        status: CuriosityStatus::parse(&status).unwrap_or(CuriosityStatus::Pending),
        priority: row.get("priority")?,
        created_at: parse_timestamp(&created_at),
        explored_at: explored_at.as_deref().map(parse_timestamp),
        resolution: row.get("resolution")?,
        produced_node_ids: json_or_default(&produced),
        metadata: json_or_default(&metadata),
    })
}

fn row_to_choice(row: &Row<'_>) -> rusqlite::Result<Choice> {
    let options: String = row.get("options")?;
    let created_at: String = row.get("created_at")?;

    Ok(Choice {
        id: row.get("id")?,
        context: row.get("context")?,
        options: json_or_default(&options),
        chosen: row.get("chosen")?,
        reasoning: row.get("reasoning")?,
        domain: row.get("domain")?,
        session_id: row.get("session_id")?,
        created_at: parse_timestamp(&created_at),
        consolidated: row.get("consolidated")?,
    })
}

fn row_to_reflection(row: &Row<'_>) -> rusqlite::Result<Reflection> {
    let kind: String = row.get("kind")?;
    let tags: String = row.get("tags")?;
    let created_at: String = row.get("created_at")?;

    Ok(Reflection {
        id: row.get("id")?,
        kind: ReflectionKind::parse(&kind).unwrap_or(ReflectionKind::Insight),
        content: row.get("content")?,
        summary: row.get("summary")?,
        session_id: row.get("session_id")?,
        importance: row.get("importance")?,
        tags: json_or_default(&tags),
        created_at: parse_timestamp(&created_at),
    })
}

fn json_string<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

impl MemoryStore for SqliteStore {
    fn create_node(&self, node: &MemoryNode) -> Result<()> {
        if node.content.trim().is_empty() {
            return Err(Error::Validation("node content must not be empty".into()));
        }
        let conn = self.lock("create_node")?;
        conn.execute(
            "INSERT INTO nodes (id, node_type, content, summary, importance, created_at,
             updated_at, session_id, metadata, tags, embedding, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                node.id.as_str(),
                node.node_type.as_str(),
                node.content,
                node.summary,
                node.importance,
                node.created_at.to_rfc3339(),
                node.updated_at.to_rfc3339(),
                node.session_id,
                json_string(&node.metadata),
                json_string(&node.tags),
                node.embedding.as_ref().map(json_string),
                node.access_count,
            ],
        )
        .map_err(storage_err("create_node"))?;
        Ok(())
    }

    fn get_node(&self, id: &NodeId) -> Result<MemoryNode> {
        let conn = self.lock("get_node")?;
        conn.query_row(
            "SELECT * FROM nodes WHERE id = ?1",
            params![id.as_str()],
            row_to_node,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound {
                entity: "node",
                id: id.to_string(),
            },
            other => storage_err("get_node")(other),
        })
    }

    fn update_node(&self, node: &MemoryNode) -> Result<()> {
        let conn = self.lock("update_node")?;
        let changed = conn
            .execute(
                "UPDATE nodes SET node_type = ?2, content = ?3, summary = ?4, importance = ?5,
                 updated_at = ?6, session_id = ?7, metadata = ?8, tags = ?9, embedding = ?10,
                 access_count = ?11 WHERE id = ?1",
                params![
                    node.id.as_str(),
                    node.node_type.as_str(),
                    node.content,
                    node.summary,
                    node.importance,
                    node.updated_at.to_rfc3339(),
                    node.session_id,
                    json_string(&node.metadata),
                    json_string(&node.tags),
                    node.embedding.as_ref().map(json_string),
                    node.access_count,
                ],
            )
            .map_err(storage_err("update_node"))?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "node",
                id: node.id.to_string(),
            });
        }
        Ok(())
    }

    fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<MemoryNode>> {
        let conn = self.lock("list_nodes")?;

        let mut sql = String::from("SELECT * FROM nodes WHERE 1=1");
        let mut bindings: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(node_type) = query.node_type {
            sql.push_str(" AND node_type = ?");
            bindings.push(Box::new(node_type.as_str().to_string()));
        }
        if let Some(text) = &query.text {
            sql.push_str(" AND (LOWER(content) LIKE ? OR LOWER(COALESCE(summary, '')) LIKE ?)");
            let pattern = format!("%{}%", text.to_lowercase());
            bindings.push(Box::new(pattern.clone()));
            bindings.push(Box::new(pattern));
        }
        sql.push_str(match query.order {
            NodeOrder::Importance => " ORDER BY importance DESC, created_at DESC",
            NodeOrder::Recency => " ORDER BY created_at DESC",
        });
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bindings.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = conn.prepare(&sql).map_err(storage_err("list_nodes"))?;
        let params = rusqlite::params_from_iter(
            bindings
                .iter()
                .map(|b| b.as_ref() as &dyn rusqlite::types::ToSql),
        );
        let rows = stmt
            .query_map(params, row_to_node)
            .map_err(storage_err("list_nodes"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("list_nodes"))
    }

    fn count_nodes(&self) -> Result<u64> {
        let conn = self.lock("count_nodes")?;
        conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .map_err(storage_err("count_nodes"))
    }

    fn create_edge(&self, edge: &MemoryEdge) -> Result<()> {
        let conn = self.lock("create_edge")?;
        for endpoint in [&edge.source_id, &edge.target_id] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
                    params![endpoint.as_str()],
                    |row| row.get(0),
                )
                .map_err(storage_err("create_edge"))?;
            if !exists {
                return Err(Error::Validation(format!(
                    "edge endpoint does not exist: {endpoint}"
                )));
            }
        }
        conn.execute(
            "INSERT INTO edges (id, source_id, target_id, edge_type, weight, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.id,
                edge.source_id.as_str(),
                edge.target_id.as_str(),
                edge.edge_type.as_str(),
                edge.weight,
                edge.description,
                edge.created_at.to_rfc3339(),
            ],
        )
        .map_err(storage_err("create_edge"))?;
        Ok(())
    }

    fn edges_for_node(&self, id: &NodeId) -> Result<Vec<MemoryEdge>> {
        let conn = self.lock("edges_for_node")?;
        let mut stmt = conn
            .prepare("SELECT * FROM edges WHERE source_id = ?1 OR target_id = ?1")
            .map_err(storage_err("edges_for_node"))?;
        let rows = stmt
            .query_map(params![id.as_str()], row_to_edge)
            .map_err(storage_err("edges_for_node"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("edges_for_node"))
    }

    fn edge_exists_between(&self, a: &NodeId, b: &NodeId) -> Result<bool> {
        let conn = self.lock("edge_exists_between")?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE
             (source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1))",
            params![a.as_str(), b.as_str()],
            |row| row.get(0),
        )
        .map_err(storage_err("edge_exists_between"))
    }

    fn create_curiosity(&self, curiosity: &Curiosity) -> Result<()> {
        if curiosity.question.trim().is_empty() {
            return Err(Error::Validation(
                "curiosity question must not be empty".into(),
            ));
        }
        let conn = self.lock("create_curiosity")?;
        conn.execute(
            "INSERT INTO curiosities (id, question, context, status, priority, created_at,
             explored_at, resolution, produced_node_ids, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                curiosity.id,
                curiosity.question,
                curiosity.context,
                curiosity.status.as_str(),
                curiosity.priority,
                curiosity.created_at.to_rfc3339(),
                curiosity.explored_at.map(|t| t.to_rfc3339()),
                curiosity.resolution,
                json_string(&curiosity.produced_node_ids),
                json_string(&curiosity.metadata),
            ],
        )
        .map_err(storage_err("create_curiosity"))?;
        Ok(())
    }

    fn get_curiosity(&self, id: &str) -> Result<Curiosity> {
        let conn = self.lock("get_curiosity")?;
        conn.query_row(
            "SELECT * FROM curiosities WHERE id = ?1",
            params![id],
            row_to_curiosity,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound {
                entity: "curiosity",
                id: id.to_string(),
            },
            other => storage_err("get_curiosity")(other),
        })
    }

    fn curiosities_by_status(&self, status: CuriosityStatus) -> Result<Vec<Curiosity>> {
        let conn = self.lock("curiosities_by_status")?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM curiosities WHERE status = ?1
                 ORDER BY priority DESC, created_at ASC",
            )
            .map_err(storage_err("curiosities_by_status"))?;
        let rows = stmt
            .query_map(params![status.as_str()], row_to_curiosity)
            .map_err(storage_err("curiosities_by_status"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("curiosities_by_status"))
    }

    fn update_curiosity(&self, curiosity: &Curiosity) -> Result<()> {
        let conn = self.lock("update_curiosity")?;
        let stored_status: String = conn
            .query_row(
                "SELECT status FROM curiosities WHERE id = ?1",
                params![curiosity.id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Error::NotFound {
                    entity: "curiosity",
                    id: curiosity.id.clone(),
                },
                other => storage_err("update_curiosity")(other),
            })?;

        let stored = CuriosityStatus::parse(&stored_status).unwrap_or(CuriosityStatus::Pending);
        if stored != curiosity.status && !stored.can_transition(curiosity.status) {
            return Err(Error::Validation(format!(
                "illegal curiosity transition: {stored} -> {}",
                curiosity.status
            )));
        }

        conn.execute(
            "UPDATE curiosities SET question = ?2, context = ?3, status = ?4, priority = ?5,
             explored_at = ?6, resolution = ?7, produced_node_ids = ?8, metadata = ?9
             WHERE id = ?1",
            params![
                curiosity.id,
                curiosity.question,
                curiosity.context,
                curiosity.status.as_str(),
                curiosity.priority,
                curiosity.explored_at.map(|t| t.to_rfc3339()),
                curiosity.resolution,
                json_string(&curiosity.produced_node_ids),
                json_string(&curiosity.metadata),
            ],
        )
        .map_err(storage_err("update_curiosity"))?;
        Ok(())
    }

    fn append_choice(&self, choice: &Choice) -> Result<()> {
        if choice.chosen.trim().is_empty() {
            return Err(Error::Validation("chosen value must not be empty".into()));
        }
        if choice.domain.trim().is_empty() {
            return Err(Error::Validation("choice domain must not be empty".into()));
        }
        let conn = self.lock("append_choice")?;
        conn.execute(
            "INSERT INTO choices (id, context, options, chosen, reasoning, domain,
             session_id, created_at, consolidated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                choice.id,
                choice.context,
                json_string(&choice.options),
                choice.chosen,
                choice.reasoning,
                choice.domain,
                choice.session_id,
                choice.created_at.to_rfc3339(),
                choice.consolidated,
            ],
        )
        .map_err(storage_err("append_choice"))?;
        Ok(())
    }

    fn list_choices(&self) -> Result<Vec<Choice>> {
        let conn = self.lock("list_choices")?;
        let mut stmt = conn
            .prepare("SELECT * FROM choices ORDER BY created_at ASC")
            .map_err(storage_err("list_choices"))?;
        let rows = stmt
            .query_map([], row_to_choice)
            .map_err(storage_err("list_choices"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("list_choices"))
    }

    fn choices_for_session(&self, session_id: &str) -> Result<Vec<Choice>> {
        let conn = self.lock("choices_for_session")?;
        let mut stmt = conn
            .prepare("SELECT * FROM choices WHERE session_id = ?1 ORDER BY created_at ASC")
            .map_err(storage_err("choices_for_session"))?;
        let rows = stmt
            .query_map(params![session_id], row_to_choice)
            .map_err(storage_err("choices_for_session"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("choices_for_session"))
    }

    fn unconsolidated_choices(&self) -> Result<Vec<Choice>> {
        let conn = self.lock("unconsolidated_choices")?;
        let mut stmt = conn
            .prepare("SELECT * FROM choices WHERE consolidated = 0 ORDER BY created_at ASC")
            .map_err(storage_err("unconsolidated_choices"))?;
        let rows = stmt
            .query_map([], row_to_choice)
            .map_err(storage_err("unconsolidated_choices"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("unconsolidated_choices"))
    }

    fn mark_choices_consolidated(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.lock("mark_choices_consolidated")?;
        let tx = conn
            .transaction()
            .map_err(storage_err("mark_choices_consolidated"))?;
        for id in ids {
            tx.execute(
                "UPDATE choices SET consolidated = 1 WHERE id = ?1",
                params![id],
            )
            .map_err(storage_err("mark_choices_consolidated"))?;
        }
        tx.commit().map_err(storage_err("mark_choices_consolidated"))
    }

    fn append_reflection(&self, reflection: &Reflection) -> Result<()> {
        let conn = self.lock("append_reflection")?;
        conn.execute(
            "INSERT INTO reflections (id, kind, content, summary, session_id, importance,
             tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                reflection.id,
                reflection.kind.as_str(),
                reflection.content,
                reflection.summary,
                reflection.session_id,
                reflection.importance,
                json_string(&reflection.tags),
                reflection.created_at.to_rfc3339(),
            ],
        )
        .map_err(storage_err("append_reflection"))?;
        Ok(())
    }

    fn recent_reflections(&self, days: i64) -> Result<Vec<Reflection>> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.lock("recent_reflections")?;
        let mut stmt = conn
            .prepare("SELECT * FROM reflections WHERE created_at >= ?1 ORDER BY created_at DESC")
            .map_err(storage_err("recent_reflections"))?;
        let rows = stmt
            .query_map(params![cutoff], row_to_reflection)
            .map_err(storage_err("recent_reflections"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("recent_reflections"))
    }

    fn reflections_for_session(&self, session_id: &str) -> Result<Vec<Reflection>> {
        let conn = self.lock("reflections_for_session")?;
        let mut stmt = conn
            .prepare("SELECT * FROM reflections WHERE session_id = ?1 ORDER BY created_at ASC")
            .map_err(storage_err("reflections_for_session"))?;
        let rows = stmt
            .query_map(params![session_id], row_to_reflection)
            .map_err(storage_err("reflections_for_session"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_err("reflections_for_session"))
    }
}
