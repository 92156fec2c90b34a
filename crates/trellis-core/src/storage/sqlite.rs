//! SQLite Graph Store
//!
//! Authoritative persistence for nodes and edges. Referential integrity and
//! (source, target, type) uniqueness are checked inside the write transaction;
//! degree and updated-at are maintained by triggers in the same statement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{Connection, ErrorCode, OptionalExtension, ToSql, params, params_from_iter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::{
    AnalyticsReport, AuditEntry, EdgeFilter, EdgeInput, EdgePatch, EdgeType, GraphEdge,
    GraphNode, GraphStats, NodeFilter, NodeInput, NodePatch, NodeType, SEMANTIC_EDGE_DECAY_RATE,
    Topology, TopologyEdge, validate_limit,
};
use crate::similarity::{embedding_from_bytes, embedding_to_bytes};
use crate::spatial::{BoundingBox, Point3};

/// Maximum bound parameters per `IN (...)` list
const ID_CHUNK: usize = 500;

/// Columns selected for every node read, including aggregated tags and embedding
const NODE_COLUMNS: &str = "n.id, n.node_type, n.timestamp, n.content, n.metadata,
    n.relevance_score, n.decay_factor, n.access_count, n.last_accessed, n.confidence,
    n.degree, n.clustering_coefficient, n.centrality, n.community_id, n.source_type,
    n.is_pruned, n.created_at, n.updated_at,
    (SELECT json_group_array(tag) FROM (
        SELECT tag FROM node_tags t WHERE t.node_id = n.id ORDER BY tag
    )) AS tags,
    (SELECT embedding FROM node_embeddings ne WHERE ne.node_id = n.id) AS embedding";

const EDGE_COLUMNS: &str = "id, source_id, target_id, edge_type, strength, context, timestamp,
    bidirectional, weight, probability, decay_rate, is_active, interaction_count,
    last_interaction, created_at, updated_at";

// ============================================================================
// TIMESTAMP HELPERS
// ============================================================================

/// Fixed-width RFC 3339 text so lexical order equals chronological order
pub(crate) fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(field: &str, value: &str, reason: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid {} '{}': {}", field, value, reason),
        )),
    )
}

/// Parse RFC3339 timestamp
fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(field_name, value, e))
}

fn parse_opt_timestamp(
    value: Option<String>,
    field_name: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(&v, field_name)).transpose()
}

fn parse_name<T: FromStr<Err = String>>(value: &str, field_name: &str) -> rusqlite::Result<T> {
    value
        .parse::<T>()
        .map_err(|e| conversion_error(field_name, value, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str, field_name: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| conversion_error(field_name, value, e))
}

/// Trimmed, lowercased, deduplicated, sorted
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn map_constraint(err: rusqlite::Error, what: &str) -> GraphError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            GraphError::Validation(format!(
                "{} violates a constraint: {}",
                what,
                msg.as_deref().unwrap_or("constraint failed")
            ))
        }
        _ => GraphError::Database(err),
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

/// Decay-relevant columns of a node or edge
#[derive(Debug, Clone)]
pub struct DecayRow {
    pub id: String,
    /// Relevance (nodes) or strength (edges)
    pub score: f64,
    /// decay_factor (nodes) or decay_rate (edges)
    pub rate: f64,
    /// Access (nodes) or interaction (edges) count
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_decayed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Set for edges only
    pub edge_type: Option<EdgeType>,
}

/// New decay state for one entity
#[derive(Debug, Clone)]
pub struct DecayUpdate {
    pub id: String,
    pub score: f64,
    pub rate: f64,
    pub prune: bool,
}

/// What a decay chunk write did
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub updated: usize,
    pub pruned: usize,
    pub cascaded_edges: usize,
    pub failed: usize,
}

/// Result of an explicit prune
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub node_id: String,
    pub already_pruned: bool,
    pub edges_deactivated: usize,
}

/// Score before and after an access/interaction boost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostOutcome {
    pub id: String,
    pub before: f64,
    pub after: f64,
    pub usage_count: i64,
    pub at: DateTime<Utc>,
}

/// A persisted spatial projection
#[derive(Debug, Clone)]
pub struct SpatialRow {
    pub node_id: String,
    pub node_type: NodeType,
    pub bbox: BoundingBox,
}

// ============================================================================
// STORAGE
// ============================================================================

/// SQLite-backed graph store
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, making Storage `Send + Sync` so engines can
/// share an `Arc<Storage>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl Storage {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("TRELLIS_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -32000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA journal_size_limit = 67108864;",
        )?;

        Ok(())
    }

    /// Platform data directory path for the default database
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "trellis", "trellis").ok_or_else(|| {
            GraphError::Init("Could not determine project directories".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(data_dir, perms);
        }
        Ok(data_dir.join(crate::DEFAULT_DB_FILE))
    }

    /// Open (or create) the store, applying pending migrations
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                p
            }
            None => Self::default_path()?,
        };

        let writer_conn = Connection::open(&path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;
        let applied = super::migrations::apply_migrations(&writer_conn)?;
        if applied > 0 {
            tracing::info!(applied, path = %path.display(), "Graph store schema migrated");
        }

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| GraphError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| GraphError::Init("Reader lock poisoned".into()))
    }

    fn audit(
        conn: &Connection,
        entity_id: &str,
        entity_kind: &str,
        action: &str,
        detail: Option<&str>,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO audit_log (entity_id, entity_kind, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entity_id, entity_kind, action, detail, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    fn write_tags(conn: &Connection, node_id: &str, tags: &[String]) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM node_tags WHERE node_id = ?1", params![node_id])?;
        let mut stmt = conn.prepare("INSERT OR IGNORE INTO node_tags (node_id, tag) VALUES (?1, ?2)")?;
        for tag in tags {
            stmt.execute(params![node_id, tag])?;
        }
        Ok(())
    }

    // ========================================================================
    // NODES
    // ========================================================================

    /// Insert a node and its caller supplied tags
    pub fn insert_node(&self, input: &NodeInput) -> Result<GraphNode> {
        input.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = format_ts(&Utc::now());
        let timestamp = input.timestamp.map(|t| format_ts(&t)).unwrap_or_else(|| now.clone());
        let content = serde_json::to_string(&input.content)?;
        let metadata = serde_json::to_string(&input.metadata)?;
        let tags = normalize_tags(&input.tags);

        {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            tx.execute(
                "INSERT INTO nodes (
                    id, node_type, timestamp, content, metadata, relevance_score,
                    confidence, source_type, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id,
                    input.node_type.as_str(),
                    timestamp,
                    content,
                    metadata,
                    input.relevance_score.unwrap_or(1.0),
                    input.confidence.unwrap_or(1.0),
                    input.source_type.as_str(),
                    now,
                ],
            )
            .map_err(|e| map_constraint(e, "node"))?;
            Self::write_tags(&tx, &id, &tags)?;
            Self::audit(&tx, &id, "node", "create", Some(input.node_type.as_str()))?;
            tx.commit()?;
        }

        self.get_node(&id)?.ok_or(GraphError::NotFound(id))
    }

    /// Get a node by ID
    pub fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let reader = self.reader()?;
        let sql = format!("SELECT {} FROM nodes n WHERE n.id = ?1", NODE_COLUMNS);
        let node = reader
            .prepare_cached(&sql)?
            .query_row(params![id], Self::row_to_node)
            .optional()?;
        Ok(node)
    }

    /// Batch fetch; missing ids are skipped, order follows `ids`
    pub fn get_nodes(&self, ids: &[String]) -> Result<Vec<GraphNode>> {
        let mut found: HashMap<String, GraphNode> = HashMap::with_capacity(ids.len());
        {
            let reader = self.reader()?;
            for chunk in ids.chunks(ID_CHUNK) {
                let sql = format!(
                    "SELECT {} FROM nodes n WHERE n.id IN ({})",
                    NODE_COLUMNS,
                    placeholders(chunk.len())
                );
                let mut stmt = reader.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), Self::row_to_node)?;
                for node in rows {
                    let node = node?;
                    found.insert(node.id.clone(), node);
                }
            }
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Convert a row to GraphNode
    fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<GraphNode> {
        let node_type: String = row.get("node_type")?;
        let source_type: String = row.get("source_type")?;
        let timestamp: String = row.get("timestamp")?;
        let content: String = row.get("content")?;
        let metadata: String = row.get("metadata")?;
        let tags: String = row.get("tags")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(GraphNode {
            id: row.get("id")?,
            node_type: parse_name(&node_type, "node_type")?,
            timestamp: parse_timestamp(&timestamp, "timestamp")?,
            content: parse_json(&content, "content")?,
            metadata: parse_json(&metadata, "metadata")?,
            relevance_score: row.get("relevance_score")?,
            decay_factor: row.get("decay_factor")?,
            access_count: row.get("access_count")?,
            last_accessed: parse_opt_timestamp(row.get("last_accessed")?, "last_accessed")?,
            confidence: row.get("confidence")?,
            degree: row.get("degree")?,
            clustering_coefficient: row.get("clustering_coefficient")?,
            centrality: row.get("centrality")?,
            community_id: row.get("community_id")?,
            tags: parse_json(&tags, "tags")?,
            embedding: embedding.map(|b| embedding_from_bytes(&b)).unwrap_or_default(),
            source_type: parse_name(&source_type, "source_type")?,
            is_pruned: row.get("is_pruned")?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Apply a partial update; a missing id is a logged no-op
    pub fn update_node(&self, id: &str, patch: &NodePatch) -> Result<Option<GraphNode>> {
        patch.validate()?;

        {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            let exists: bool = tx
                .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                tracing::warn!(node_id = id, "update_node: node not found, ignoring patch");
                return Ok(None);
            }

            if !patch.is_empty() {
                let mut sets: Vec<&str> = vec!["updated_at = ?"];
                let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(format_ts(&Utc::now()))];
                if let Some(content) = &patch.content {
                    sets.push("content = ?");
                    values.push(Box::new(serde_json::to_string(content)?));
                }
                if let Some(metadata) = &patch.metadata {
                    sets.push("metadata = ?");
                    values.push(Box::new(serde_json::to_string(metadata)?));
                }
                if let Some(score) = patch.relevance_score {
                    sets.push("relevance_score = ?");
                    values.push(Box::new(score));
                }
                if let Some(factor) = patch.decay_factor {
                    sets.push("decay_factor = ?");
                    values.push(Box::new(factor));
                }
                if let Some(confidence) = patch.confidence {
                    sets.push("confidence = ?");
                    values.push(Box::new(confidence));
                }
                values.push(Box::new(id.to_string()));

                let sql = format!("UPDATE nodes SET {} WHERE id = ?", sets.join(", "));
                tx.execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| map_constraint(e, "node patch"))?;

                if let Some(tags) = &patch.tags {
                    Self::write_tags(&tx, id, &normalize_tags(tags))?;
                }
                Self::audit(&tx, id, "node", "update", None)?;
            }
            tx.commit()?;
        }

        self.get_node(id)
    }

    /// Query nodes by predicates
    pub fn query_nodes(
        &self,
        filter: &NodeFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GraphNode>> {
        filter.validate()?;
        validate_limit(limit)?;

        let (mut sql, mut values) = Self::node_predicates(filter);
        sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", filter.order.sql()));
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));
        self.select_nodes(&sql, &values)
    }

    /// Keyset page of nodes matching `filter`, ordered by id
    ///
    /// `filter.order` is ignored so a scan can walk every match without
    /// offset paging.
    pub fn query_node_page(
        &self,
        filter: &NodeFilter,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        filter.validate()?;
        validate_limit(limit)?;

        let (mut sql, mut values) = Self::node_predicates(filter);
        sql.push_str(" AND n.id > ? ORDER BY n.id LIMIT ?");
        values.push(Box::new(after.unwrap_or("").to_string()));
        values.push(Box::new(limit as i64));
        self.select_nodes(&sql, &values)
    }

    fn select_nodes(&self, sql: &str, values: &[Box<dyn ToSql>]) -> Result<Vec<GraphNode>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let nodes = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn node_predicates(filter: &NodeFilter) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = format!("SELECT {} FROM nodes n WHERE 1 = 1", NODE_COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if !filter.include_pruned {
            sql.push_str(" AND n.is_pruned = 0");
        }
        if !filter.node_types.is_empty() {
            sql.push_str(&format!(" AND n.node_type IN ({})", placeholders(filter.node_types.len())));
            for t in &filter.node_types {
                values.push(Box::new(t.as_str()));
            }
        }
        if !filter.source_types.is_empty() {
            sql.push_str(&format!(
                " AND n.source_type IN ({})",
                placeholders(filter.source_types.len())
            ));
            for t in &filter.source_types {
                values.push(Box::new(t.as_str()));
            }
        }
        if let Some(min) = filter.min_relevance {
            sql.push_str(" AND n.relevance_score >= ?");
            values.push(Box::new(min));
        }
        if let Some(max) = filter.max_relevance {
            sql.push_str(" AND n.relevance_score <= ?");
            values.push(Box::new(max));
        }
        if let Some(from) = filter.timestamp_from {
            sql.push_str(" AND n.timestamp >= ?");
            values.push(Box::new(format_ts(&from)));
        }
        if let Some(to) = filter.timestamp_to {
            sql.push_str(" AND n.timestamp <= ?");
            values.push(Box::new(format_ts(&to)));
        }
        if let Some(from) = filter.created_from {
            sql.push_str(" AND n.created_at >= ?");
            values.push(Box::new(format_ts(&from)));
        }
        if let Some(to) = filter.created_to {
            sql.push_str(" AND n.created_at <= ?");
            values.push(Box::new(format_ts(&to)));
        }
        if !filter.tags_any.is_empty() {
            let tags = normalize_tags(&filter.tags_any);
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM node_tags t WHERE t.node_id = n.id AND t.tag IN ({}))",
                placeholders(tags.len())
            ));
            for tag in tags {
                values.push(Box::new(tag));
            }
        }
        if let Some(community) = filter.community_id {
            sql.push_str(" AND n.community_id = ?");
            values.push(Box::new(community));
        }
        if let Some(needle) = &filter.content_contains {
            sql.push_str(" AND instr(lower(n.content), lower(?)) > 0");
            values.push(Box::new(needle.clone()));
        }
        (sql, values)
    }

    /// Soft-prune a node and deactivate every edge it is the source of
    pub fn prune_node(&self, id: &str) -> Result<Option<PruneOutcome>> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        let pruned: Option<bool> = tx
            .query_row("SELECT is_pruned FROM nodes WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        let Some(already_pruned) = pruned else {
            tracing::warn!(node_id = id, "prune_node: node not found");
            return Ok(None);
        };

        tx.execute("UPDATE nodes SET is_pruned = 1 WHERE id = ?1", params![id])?;
        let edges_deactivated = tx.execute(
            "UPDATE edges SET is_active = 0 WHERE source_id = ?1 AND is_active = 1",
            params![id],
        )?;
        if !already_pruned || edges_deactivated > 0 {
            Self::audit(
                &tx,
                id,
                "node",
                "prune",
                Some(&format!("{} outgoing edges deactivated", edges_deactivated)),
            )?;
        }
        tx.commit()?;

        Ok(Some(PruneOutcome {
            node_id: id.to_string(),
            already_pruned,
            edges_deactivated,
        }))
    }

    /// Store extracted tags and embedding for a node
    pub fn set_node_features(
        &self,
        node_id: &str,
        tags: &[String],
        embedding: &[f32],
        model: &str,
    ) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        Self::write_tags(&tx, node_id, &normalize_tags(tags))?;
        if !embedding.is_empty() {
            tx.execute(
                "INSERT OR REPLACE INTO node_embeddings (node_id, embedding, dimensions, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    node_id,
                    embedding_to_bytes(embedding),
                    embedding.len() as i64,
                    model,
                    format_ts(&Utc::now()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Ids of non-pruned nodes created or changed after `since`, oldest change first
    pub fn changed_node_ids(&self, since: Option<DateTime<Utc>>, limit: usize) -> Result<Vec<String>> {
        let since = since.map(|s| format_ts(&s)).unwrap_or_default();
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id FROM nodes
             WHERE is_pruned = 0 AND (created_at > ?1 OR updated_at > ?1)
             ORDER BY updated_at, id
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![since, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    // ========================================================================
    // EDGES
    // ========================================================================

    /// Insert an edge after checking both endpoints and uniqueness
    pub fn insert_edge(&self, input: &EdgeInput) -> Result<GraphEdge> {
        input.validate()?;

        let id = Uuid::new_v4().to_string();
        let now = format_ts(&Utc::now());
        let timestamp = input.timestamp.map(|t| format_ts(&t)).unwrap_or_else(|| now.clone());
        let decay_rate = input
            .decay_rate
            .unwrap_or_else(|| input.edge_type.default_decay_rate());

        {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;

            let endpoints: Vec<(String, bool)> = tx
                .prepare("SELECT id, is_pruned FROM nodes WHERE id IN (?1, ?2)")?
                .query_map(params![input.source_id, input.target_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<_>>()?;

            for endpoint in [&input.source_id, &input.target_id] {
                match endpoints.iter().find(|(id, _)| id == endpoint) {
                    None => {
                        return Err(GraphError::Reference(format!(
                            "edge endpoint {} does not exist",
                            endpoint
                        )));
                    }
                    Some((_, true)) => {
                        return Err(GraphError::Reference(format!(
                            "edge endpoint {} is pruned",
                            endpoint
                        )));
                    }
                    Some(_) => {}
                }
            }

            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM edges WHERE source_id = ?1 AND target_id = ?2 AND edge_type = ?3",
                    params![input.source_id, input.target_id, input.edge_type.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing {
                return Err(GraphError::Validation(format!(
                    "{} edge {} -> {} already exists ({})",
                    input.edge_type, input.source_id, input.target_id, existing
                )));
            }

            tx.execute(
                "INSERT INTO edges (
                    id, source_id, target_id, edge_type, strength, context, timestamp,
                    bidirectional, weight, probability, decay_rate, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                params![
                    id,
                    input.source_id,
                    input.target_id,
                    input.edge_type.as_str(),
                    input.strength,
                    input.context,
                    timestamp,
                    input.bidirectional,
                    input.weight.unwrap_or(input.strength),
                    input.probability.unwrap_or(1.0),
                    decay_rate,
                    now,
                ],
            )
            .map_err(|e| map_constraint(e, "edge"))?;
            Self::audit(&tx, &id, "edge", "create", Some(input.edge_type.as_str()))?;
            tx.commit()?;
        }

        self.get_edge(&id)?.ok_or(GraphError::NotFound(id))
    }

    /// Get an edge by ID
    pub fn get_edge(&self, id: &str) -> Result<Option<GraphEdge>> {
        let reader = self.reader()?;
        let sql = format!("SELECT {} FROM edges WHERE id = ?1", EDGE_COLUMNS);
        let edge = reader
            .prepare_cached(&sql)?
            .query_row(params![id], Self::row_to_edge)
            .optional()?;
        Ok(edge)
    }

    /// Convert a row to GraphEdge
    fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<GraphEdge> {
        let edge_type: String = row.get("edge_type")?;
        let timestamp: String = row.get("timestamp")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(GraphEdge {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            edge_type: parse_name(&edge_type, "edge_type")?,
            strength: row.get("strength")?,
            context: row.get("context")?,
            timestamp: parse_timestamp(&timestamp, "timestamp")?,
            bidirectional: row.get("bidirectional")?,
            weight: row.get("weight")?,
            probability: row.get("probability")?,
            decay_rate: row.get("decay_rate")?,
            is_active: row.get("is_active")?,
            interaction_count: row.get("interaction_count")?,
            last_interaction: parse_opt_timestamp(row.get("last_interaction")?, "last_interaction")?,
            created_at: parse_timestamp(&created_at, "created_at")?,
            updated_at: parse_timestamp(&updated_at, "updated_at")?,
        })
    }

    /// Apply a partial update; a missing id is a logged no-op
    pub fn update_edge(&self, id: &str, patch: &EdgePatch) -> Result<Option<GraphEdge>> {
        patch.validate()?;

        {
            let mut writer = self.writer()?;
            let tx = writer.transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM edges WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                tracing::warn!(edge_id = id, "update_edge: edge not found, ignoring patch");
                return Ok(None);
            }

            if !patch.is_empty() {
                let mut sets: Vec<&str> = vec!["updated_at = ?"];
                let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(format_ts(&Utc::now()))];
                if let Some(strength) = patch.strength {
                    sets.push("strength = ?");
                    values.push(Box::new(strength));
                }
                if let Some(context) = &patch.context {
                    sets.push("context = ?");
                    values.push(Box::new(context.clone()));
                }
                if let Some(weight) = patch.weight {
                    sets.push("weight = ?");
                    values.push(Box::new(weight));
                }
                if let Some(probability) = patch.probability {
                    sets.push("probability = ?");
                    values.push(Box::new(probability));
                }
                if let Some(rate) = patch.decay_rate {
                    sets.push("decay_rate = ?");
                    values.push(Box::new(rate));
                }
                if let Some(bidirectional) = patch.bidirectional {
                    sets.push("bidirectional = ?");
                    values.push(Box::new(bidirectional));
                }
                values.push(Box::new(id.to_string()));

                let sql = format!("UPDATE edges SET {} WHERE id = ?", sets.join(", "));
                tx.execute(&sql, params_from_iter(values.iter()))
                    .map_err(|e| map_constraint(e, "edge patch"))?;
                Self::audit(&tx, id, "edge", "update", None)?;
            }
            tx.commit()?;
        }

        self.get_edge(id)
    }

    /// Query edges by predicates
    pub fn query_edges(
        &self,
        filter: &EdgeFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GraphEdge>> {
        filter.validate()?;
        validate_limit(limit)?;

        let mut sql = format!("SELECT {} FROM edges WHERE 1 = 1", EDGE_COLUMNS);
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if !filter.include_inactive {
            sql.push_str(" AND is_active = 1");
        }
        if !filter.edge_types.is_empty() {
            sql.push_str(&format!(" AND edge_type IN ({})", placeholders(filter.edge_types.len())));
            for t in &filter.edge_types {
                values.push(Box::new(t.as_str()));
            }
        }
        if let Some(source) = &filter.source_id {
            sql.push_str(" AND source_id = ?");
            values.push(Box::new(source.clone()));
        }
        if let Some(target) = &filter.target_id {
            sql.push_str(" AND target_id = ?");
            values.push(Box::new(target.clone()));
        }
        if let Some(node) = &filter.node_id {
            sql.push_str(" AND (source_id = ? OR target_id = ?)");
            values.push(Box::new(node.clone()));
            values.push(Box::new(node.clone()));
        }
        if let Some(min) = filter.min_strength {
            sql.push_str(" AND strength >= ?");
            values.push(Box::new(min));
        }
        if let Some(bidirectional) = filter.bidirectional {
            sql.push_str(" AND bidirectional = ?");
            values.push(Box::new(bidirectional));
        }

        sql.push_str(" ORDER BY strength DESC, id LIMIT ? OFFSET ?");
        values.push(Box::new(limit as i64));
        values.push(Box::new(offset as i64));

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let edges = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Edge of `edge_type` between two nodes in either direction, active or not
    pub fn edge_between(&self, a: &str, b: &str, edge_type: EdgeType) -> Result<Option<GraphEdge>> {
        let reader = self.reader()?;
        let sql = format!(
            "SELECT {} FROM edges
             WHERE edge_type = ?3
               AND ((source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1))
             ORDER BY is_active DESC
             LIMIT 1",
            EDGE_COLUMNS
        );
        let edge = reader
            .prepare_cached(&sql)?
            .query_row(params![a, b, edge_type.as_str()], Self::row_to_edge)
            .optional()?;
        Ok(edge)
    }

    /// Soft-delete an edge; returns false if it was missing or already inactive
    pub fn deactivate_edge(&self, id: &str) -> Result<bool> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let changed = tx.execute(
            "UPDATE edges SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![id],
        )?;
        if changed > 0 {
            Self::audit(&tx, id, "edge", "deactivate", None)?;
        } else {
            tracing::warn!(edge_id = id, "deactivate_edge: edge missing or already inactive");
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    // ========================================================================
    // ACCESS BOOSTS
    // ========================================================================

    /// Read-modify-write a node's relevance on access
    ///
    /// `boost` maps the current score to the new one. Pruned or missing nodes
    /// are left untouched and yield `None`.
    pub fn boost_node(
        &self,
        id: &str,
        now: DateTime<Utc>,
        boost: impl FnOnce(f64) -> f64,
    ) -> Result<Option<BoostOutcome>> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let current: Option<(f64, i64, bool)> = tx
            .query_row(
                "SELECT relevance_score, access_count, is_pruned FROM nodes WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((before, count, pruned)) = current else {
            return Ok(None);
        };
        if pruned {
            tracing::warn!(node_id = id, "Access to pruned node does not boost relevance");
            return Ok(None);
        }

        let after = boost(before).clamp(0.0, 1.0).max(before);
        tx.execute(
            "UPDATE nodes SET relevance_score = ?1, access_count = access_count + 1, last_accessed = ?2
             WHERE id = ?3",
            params![after, format_ts(&now), id],
        )?;
        tx.commit()?;

        Ok(Some(BoostOutcome {
            id: id.to_string(),
            before,
            after,
            usage_count: count + 1,
            at: now,
        }))
    }

    /// Read-modify-write an edge's strength on interaction
    pub fn boost_edge(
        &self,
        id: &str,
        now: DateTime<Utc>,
        boost: impl FnOnce(f64) -> f64,
    ) -> Result<Option<BoostOutcome>> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let current: Option<(f64, i64, bool)> = tx
            .query_row(
                "SELECT strength, interaction_count, is_active FROM edges WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((before, count, active)) = current else {
            return Ok(None);
        };
        if !active {
            tracing::warn!(edge_id = id, "Interaction with inactive edge does not boost strength");
            return Ok(None);
        }

        let after = boost(before).clamp(0.0, 1.0).max(before);
        tx.execute(
            "UPDATE edges SET strength = ?1, interaction_count = interaction_count + 1,
                              last_interaction = ?2
             WHERE id = ?3",
            params![after, format_ts(&now), id],
        )?;
        tx.commit()?;

        Ok(Some(BoostOutcome {
            id: id.to_string(),
            before,
            after,
            usage_count: count + 1,
            at: now,
        }))
    }

    // ========================================================================
    // DECAY
    // ========================================================================

    fn collect_decay_rows(
        &self,
        sql: &str,
        after: Option<&str>,
        limit: usize,
        with_type: bool,
    ) -> Result<Vec<DecayRow>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare_cached(sql)?;
        let rows = stmt.query_map(params![after.unwrap_or(""), limit as i64], |row| {
            let id: String = row.get(0)?;
            let created_at: String = row.get(6)?;
            let edge_type = if with_type {
                let t: String = row.get(7)?;
                Some(parse_name::<EdgeType>(&t, "edge_type")?)
            } else {
                None
            };
            Ok(DecayRow {
                score: row.get(1)?,
                rate: row.get(2)?,
                usage_count: row.get(3)?,
                last_used: parse_opt_timestamp(row.get(4)?, "last_used")?,
                last_decayed: parse_opt_timestamp(row.get(5)?, "last_decayed_at")?,
                created_at: parse_timestamp(&created_at, "created_at")?,
                edge_type,
                id,
            })
        })?;

        let mut out = Vec::with_capacity(limit);
        for row in rows {
            match row {
                Ok(r) => out.push(r),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable row during decay scan"),
            }
        }
        Ok(out)
    }

    /// Next page of non-pruned nodes with id greater than `after`
    pub fn node_decay_batch(&self, after: Option<&str>, limit: usize) -> Result<Vec<DecayRow>> {
        self.collect_decay_rows(
            "SELECT id, relevance_score, decay_factor, access_count, last_accessed,
                    last_decayed_at, created_at
             FROM nodes
             WHERE is_pruned = 0 AND id > ?1
             ORDER BY id
             LIMIT ?2",
            after,
            limit,
            false,
        )
    }

    /// Next page of active edges with id greater than `after`
    pub fn edge_decay_batch(&self, after: Option<&str>, limit: usize) -> Result<Vec<DecayRow>> {
        self.collect_decay_rows(
            "SELECT id, strength, decay_rate, interaction_count, last_interaction,
                    last_decayed_at, created_at, edge_type
             FROM edges
             WHERE is_active = 1 AND id > ?1
             ORDER BY id
             LIMIT ?2",
            after,
            limit,
            true,
        )
    }

    /// Write one chunk of node decay results in a single transaction
    ///
    /// Per-node failures are logged and counted; transaction failures propagate.
    pub fn apply_node_decay(&self, updates: &[DecayUpdate], now: DateTime<Utc>) -> Result<ChunkOutcome> {
        let now = format_ts(&now);
        let mut outcome = ChunkOutcome::default();
        let mut writer = self.writer()?;
        let mut tx = writer.transaction()?;

        for update in updates {
            // A failed entity rolls back to its savepoint and leaves the chunk intact
            let result = tx.savepoint().and_then(|sp| {
                let cascaded = Self::decay_node_row(&sp, update, &now)?;
                sp.commit()?;
                Ok(cascaded)
            });

            match result {
                Ok(None) => outcome.updated += 1,
                Ok(Some(cascaded)) => {
                    outcome.updated += 1;
                    outcome.pruned += 1;
                    outcome.cascaded_edges += cascaded;
                }
                Err(e) => {
                    tracing::warn!(node_id = %update.id, error = %e, "Skipping node during decay");
                    outcome.failed += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Returns the cascaded edge count when the node was pruned
    fn decay_node_row(conn: &Connection, update: &DecayUpdate, now: &str) -> rusqlite::Result<Option<usize>> {
        conn.execute(
            "UPDATE nodes SET relevance_score = ?1, decay_factor = ?2, last_decayed_at = ?3
             WHERE id = ?4 AND is_pruned = 0",
            params![update.score, update.rate, now, update.id],
        )?;
        if !update.prune {
            return Ok(None);
        }
        conn.execute("UPDATE nodes SET is_pruned = 1 WHERE id = ?1", params![update.id])?;
        let cascaded = conn.execute(
            "UPDATE edges SET is_active = 0 WHERE source_id = ?1 AND is_active = 1",
            params![update.id],
        )?;
        Self::audit(conn, &update.id, "node", "prune", Some("relevance below minimum"))?;
        Ok(Some(cascaded))
    }

    /// Write one chunk of edge decay results in a single transaction
    pub fn apply_edge_decay(&self, updates: &[DecayUpdate], now: DateTime<Utc>) -> Result<ChunkOutcome> {
        let now = format_ts(&now);
        let mut outcome = ChunkOutcome::default();
        let mut writer = self.writer()?;
        let mut tx = writer.transaction()?;

        for update in updates {
            let result = tx.savepoint().and_then(|sp| {
                sp.execute(
                    "UPDATE edges SET strength = ?1, decay_rate = ?2, last_decayed_at = ?3,
                                      is_active = CASE WHEN ?4 THEN 0 ELSE is_active END
                     WHERE id = ?5 AND is_active = 1",
                    params![update.score, update.rate, now, update.prune, update.id],
                )?;
                if update.prune {
                    Self::audit(&sp, &update.id, "edge", "prune", Some("strength below minimum"))?;
                }
                sp.commit()
            });

            match result {
                Ok(()) => {
                    outcome.updated += 1;
                    if update.prune {
                        outcome.pruned += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(edge_id = %update.id, error = %e, "Skipping edge during decay");
                    outcome.failed += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    /// Restore every relevance and strength to 1.0 and reset rate multipliers
    ///
    /// Prune flags are left as they are. Returns (nodes, edges) touched.
    pub fn reset_decay(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let now = format_ts(&now);
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let nodes = tx.execute(
            "UPDATE nodes SET relevance_score = 1.0, decay_factor = 1.0, last_decayed_at = ?1",
            params![now],
        )?;
        let edges = tx.execute(
            "UPDATE edges SET strength = 1.0, last_decayed_at = ?1,
                              decay_rate = CASE WHEN edge_type = 'semantic' THEN ?2 ELSE 1.0 END",
            params![now, SEMANTIC_EDGE_DECAY_RATE],
        )?;
        Self::audit(
            &tx,
            "*",
            "graph",
            "reset_decay",
            Some(&format!("{} nodes, {} edges", nodes, edges)),
        )?;
        tx.commit()?;
        Ok((nodes, edges))
    }

    // ========================================================================
    // MAINTENANCE STATE
    // ========================================================================

    /// Read a maintenance value
    pub fn get_state(&self, key: &str) -> Result<Option<String>> {
        let reader = self.reader()?;
        let value = reader
            .query_row(
                "SELECT value FROM maintenance_state WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a maintenance value
    pub fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO maintenance_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, format_ts(&Utc::now())],
        )?;
        Ok(())
    }

    /// Remove a maintenance value
    pub fn clear_state(&self, key: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("DELETE FROM maintenance_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Read a maintenance timestamp
    pub fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get_state(key)? {
            Some(value) => match DateTime::parse_from_rfc3339(&value) {
                Ok(dt) => Ok(Some(dt.with_timezone(&Utc))),
                Err(e) => {
                    tracing::warn!(key, value, error = %e, "Ignoring unreadable maintenance timestamp");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Write a maintenance timestamp
    pub fn set_timestamp(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.set_state(key, &format_ts(&at))
    }

    // ========================================================================
    // SPATIAL PROJECTION
    // ========================================================================

    /// Persist one node's projected box
    pub fn upsert_spatial(&self, row: &SpatialRow) -> Result<()> {
        let writer = self.writer()?;
        Self::write_spatial(&writer, row)?;
        Ok(())
    }

    fn write_spatial(conn: &Connection, row: &SpatialRow) -> rusqlite::Result<()> {
        let b = &row.bbox;
        conn.execute(
            "INSERT OR REPLACE INTO spatial_index
                (node_id, node_type, min_x, min_y, min_z, max_x, max_y, max_z, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.node_id,
                row.node_type.as_str(),
                b.min.x,
                b.min.y,
                b.min.z,
                b.max.x,
                b.max.y,
                b.max.z,
                format_ts(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    /// Forget one node's projected box
    pub fn remove_spatial(&self, node_id: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.execute("DELETE FROM spatial_index WHERE node_id = ?1", params![node_id])?;
        Ok(())
    }

    /// Replace the whole projection relation
    pub fn replace_spatial(&self, rows: &[SpatialRow]) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute("DELETE FROM spatial_index", [])?;
        for row in rows {
            Self::write_spatial(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Projections of every non-pruned node
    pub fn load_spatial(&self) -> Result<Vec<SpatialRow>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT s.node_id, s.node_type, s.min_x, s.min_y, s.min_z, s.max_x, s.max_y, s.max_z
             FROM spatial_index s JOIN nodes n ON n.id = s.node_id
             WHERE n.is_pruned = 0",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let node_type: String = row.get(1)?;
                Ok(SpatialRow {
                    node_id: row.get(0)?,
                    node_type: parse_name(&node_type, "node_type")?,
                    bbox: BoundingBox::new(
                        Point3::new(row.get(2)?, row.get(3)?, row.get(4)?),
                        Point3::new(row.get(5)?, row.get(6)?, row.get(7)?),
                    ),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every non-pruned node, paged by id for bulk rebuilds
    pub fn node_page(&self, after: Option<&str>, limit: usize) -> Result<Vec<GraphNode>> {
        let reader = self.reader()?;
        let sql = format!(
            "SELECT {} FROM nodes n WHERE n.is_pruned = 0 AND n.id > ?1 ORDER BY n.id LIMIT ?2",
            NODE_COLUMNS
        );
        let mut stmt = reader.prepare_cached(&sql)?;
        let nodes = stmt
            .query_map(params![after.unwrap_or(""), limit as i64], Self::row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // ========================================================================
    // ANALYTICS
    // ========================================================================

    /// Recompute every degree from the edge table; returns rows corrected
    pub fn repair_degrees(&self) -> Result<usize> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE nodes SET degree = (
                SELECT COUNT(*) FROM edges e
                WHERE e.is_active = 1 AND (e.source_id = nodes.id OR e.target_id = nodes.id)
             )
             WHERE degree != (
                SELECT COUNT(*) FROM edges e
                WHERE e.is_active = 1 AND (e.source_id = nodes.id OR e.target_id = nodes.id)
             )",
            [],
        )?;
        if changed > 0 {
            tracing::warn!(changed, "Corrected drifted node degrees");
        }
        Ok(changed)
    }

    /// Non-pruned nodes and the active edges between them
    pub fn load_topology(&self) -> Result<Topology> {
        let reader = self.reader()?;
        let nodes = reader
            .prepare("SELECT id, node_type FROM nodes WHERE is_pruned = 0 ORDER BY id")?
            .query_map([], |row| {
                let t: String = row.get(1)?;
                Ok((row.get::<_, String>(0)?, parse_name::<NodeType>(&t, "node_type")?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let edges = reader
            .prepare(
                "SELECT e.id, e.source_id, e.target_id, e.edge_type, e.strength
                 FROM edges e
                 JOIN nodes s ON s.id = e.source_id AND s.is_pruned = 0
                 JOIN nodes t ON t.id = e.target_id AND t.is_pruned = 0
                 WHERE e.is_active = 1
                 ORDER BY e.id",
            )?
            .query_map([], |row| {
                let t: String = row.get(3)?;
                Ok(TopologyEdge {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    target_id: row.get(2)?,
                    edge_type: parse_name(&t, "edge_type")?,
                    strength: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Topology { nodes, edges })
    }

    /// Write node metrics and derived relations from an analytics pass
    pub fn apply_analytics(&self, report: &AnalyticsReport) -> Result<()> {
        let now = format_ts(&Utc::now());
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        tx.execute(
            "UPDATE nodes SET clustering_coefficient = 0.0, centrality = 0.0, community_id = NULL
             WHERE is_pruned = 0",
            [],
        )?;
        {
            let mut stmt = tx.prepare(
                "UPDATE nodes SET clustering_coefficient = ?1, centrality = ?2, community_id = ?3
                 WHERE id = ?4",
            )?;
            for m in &report.metrics {
                stmt.execute(params![m.clustering_coefficient, m.centrality, m.community_id, m.node_id])?;
            }
        }

        tx.execute("DELETE FROM communities", [])?;
        for c in &report.communities {
            tx.execute(
                "INSERT INTO communities (id, size, density, members, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![c.id, c.members.len() as i64, c.density, serde_json::to_string(&c.members)?, now],
            )?;
        }

        tx.execute("DELETE FROM clusters", [])?;
        for c in &report.clusters {
            tx.execute(
                "INSERT INTO clusters (id, size, average_strength, members, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.id,
                    c.members.len() as i64,
                    c.average_strength,
                    serde_json::to_string(&c.members)?,
                    now
                ],
            )?;
        }

        for p in &report.patterns {
            tx.execute(
                "INSERT INTO detected_patterns (
                    signature, source_type, edge_type, target_type, occurrences,
                    example_edge_ids, first_seen, last_seen
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(signature) DO UPDATE SET
                    occurrences = excluded.occurrences,
                    example_edge_ids = excluded.example_edge_ids,
                    last_seen = excluded.last_seen",
                params![
                    p.signature(),
                    p.source_type.as_str(),
                    p.edge_type.as_str(),
                    p.target_type.as_str(),
                    p.occurrences as i64,
                    serde_json::to_string(&p.example_edge_ids)?,
                    now,
                ],
            )?;
        }

        let s = &report.summary;
        tx.execute(
            "INSERT INTO graph_statistics (
                node_count, edge_count, density, average_degree, average_clustering,
                component_count, community_count, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                s.node_count as i64,
                s.edge_count as i64,
                s.density,
                s.average_degree,
                s.average_clustering,
                s.component_count as i64,
                s.community_count as i64,
                now,
            ],
        )?;
        Self::audit(&tx, "*", "graph", "optimize", Some(&serde_json::to_string(s)?))?;
        tx.commit()?;
        Ok(())
    }

    /// Run SQLite's planner statistics and optimizer
    pub fn optimize_database(&self) -> Result<()> {
        let writer = self.writer()?;
        writer.execute_batch("ANALYZE; PRAGMA optimize;")?;
        Ok(())
    }

    // ========================================================================
    // STATISTICS & AUDIT
    // ========================================================================

    /// Store-wide counters
    pub fn stats(&self) -> Result<GraphStats> {
        let reader = self.reader()?;

        let (total_nodes, pruned_nodes, average_relevance, average_degree, oldest, newest): (
            i64,
            i64,
            Option<f64>,
            Option<f64>,
            Option<String>,
            Option<String>,
        ) = reader.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_pruned), 0),
                    AVG(CASE WHEN is_pruned = 0 THEN relevance_score END),
                    AVG(CASE WHEN is_pruned = 0 THEN degree END),
                    MIN(timestamp),
                    MAX(timestamp)
             FROM nodes",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )?;

        let (total_edges, active_edges, semantic_edges, average_strength): (i64, i64, i64, Option<f64>) =
            reader.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_active), 0),
                        COALESCE(SUM(CASE WHEN edge_type = 'semantic' AND is_active = 1 THEN 1 ELSE 0 END), 0),
                        AVG(CASE WHEN is_active = 1 THEN strength END)
                 FROM edges",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )?;

        let nodes_with_embeddings: i64 =
            reader.query_row("SELECT COUNT(*) FROM node_embeddings", [], |r| r.get(0))?;
        let communities: i64 = reader.query_row("SELECT COUNT(*) FROM communities", [], |r| r.get(0))?;

        let nodes_by_type = reader
            .prepare(
                "SELECT node_type, COUNT(*) FROM nodes WHERE is_pruned = 0
                 GROUP BY node_type ORDER BY COUNT(*) DESC, node_type",
            )?
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        Ok(GraphStats {
            total_nodes,
            active_nodes: total_nodes - pruned_nodes,
            pruned_nodes,
            total_edges,
            active_edges,
            inactive_edges: total_edges - active_edges,
            semantic_edges,
            average_relevance: average_relevance.unwrap_or(0.0),
            average_strength: average_strength.unwrap_or(0.0),
            average_degree: average_degree.unwrap_or(0.0),
            nodes_with_embeddings,
            communities,
            nodes_by_type,
            oldest_node: parse_opt_timestamp(oldest, "timestamp")?,
            newest_node: parse_opt_timestamp(newest, "timestamp")?,
        })
    }

    /// Most recent audit entries, optionally for one entity
    pub fn audit_log(&self, entity_id: Option<&str>, limit: usize) -> Result<Vec<AuditEntry>> {
        validate_limit(limit)?;
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, entity_id, entity_kind, action, detail, created_at
             FROM audit_log
             WHERE ?1 IS NULL OR entity_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![entity_id, limit as i64], |row| {
                let created_at: String = row.get(5)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    entity_id: row.get(1)?,
                    entity_kind: row.get(2)?,
                    action: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: parse_timestamp(&created_at, "created_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

// ============================================================================
// TESTS
// ============================================================================
