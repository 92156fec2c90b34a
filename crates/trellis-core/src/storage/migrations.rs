//! Database Migrations
//!
//! Schema migration definitions for the graph store.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial graph schema: nodes, edges, tags, embeddings, degree triggers",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Spatial index projection and maintenance state",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Derived relations: communities, clusters, patterns, statistics, audit log",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
///
/// Timestamps are fixed-width RFC 3339 with microseconds so that text
/// comparison orders them chronologically. Triggers write the same shape.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT 'null',
    metadata TEXT NOT NULL DEFAULT '{}',

    -- Relevance
    relevance_score REAL NOT NULL DEFAULT 1.0
        CHECK (relevance_score >= 0.0 AND relevance_score <= 1.0),
    decay_factor REAL NOT NULL DEFAULT 1.0 CHECK (decay_factor > 0.0),
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    last_decayed_at TEXT,
    confidence REAL NOT NULL DEFAULT 1.0
        CHECK (confidence >= 0.0 AND confidence <= 1.0),

    -- Structure (degree is trigger-maintained)
    degree INTEGER NOT NULL DEFAULT 0,
    clustering_coefficient REAL NOT NULL DEFAULT 0.0,
    centrality REAL NOT NULL DEFAULT 0.0,
    community_id INTEGER,

    -- Provenance
    source_type TEXT NOT NULL DEFAULT 'event',
    is_pruned INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
CREATE INDEX IF NOT EXISTS idx_nodes_timestamp ON nodes(timestamp);
CREATE INDEX IF NOT EXISTS idx_nodes_relevance ON nodes(relevance_score);
CREATE INDEX IF NOT EXISTS idx_nodes_pruned ON nodes(is_pruned);
CREATE INDEX IF NOT EXISTS idx_nodes_created ON nodes(created_at);
CREATE INDEX IF NOT EXISTS idx_nodes_updated ON nodes(updated_at);
CREATE INDEX IF NOT EXISTS idx_nodes_community ON nodes(community_id);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    edge_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5 CHECK (strength >= 0.0 AND strength <= 1.0),
    context TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    bidirectional INTEGER NOT NULL DEFAULT 0,
    weight REAL NOT NULL DEFAULT 0.5 CHECK (weight >= 0.0),
    probability REAL NOT NULL DEFAULT 1.0 CHECK (probability >= 0.0 AND probability <= 1.0),
    decay_rate REAL NOT NULL DEFAULT 1.0 CHECK (decay_rate > 0.0),
    is_active INTEGER NOT NULL DEFAULT 1,
    interaction_count INTEGER NOT NULL DEFAULT 0,
    last_interaction TEXT,
    last_decayed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(source_id, target_id, edge_type)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
CREATE INDEX IF NOT EXISTS idx_edges_active ON edges(is_active);

CREATE TABLE IF NOT EXISTS node_tags (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    PRIMARY KEY (node_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_node_tags_tag ON node_tags(tag);

-- Embeddings storage table (little-endian f32 blob)
CREATE TABLE IF NOT EXISTS node_embeddings (
    node_id TEXT PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Degree = active edges touching the node, recomputed for both endpoints
CREATE TRIGGER IF NOT EXISTS edges_degree_ai AFTER INSERT ON edges BEGIN
    UPDATE nodes SET degree = (
        SELECT COUNT(*) FROM edges e
        WHERE e.is_active = 1 AND (e.source_id = nodes.id OR e.target_id = nodes.id)
    )
    WHERE id IN (NEW.source_id, NEW.target_id);
END;

CREATE TRIGGER IF NOT EXISTS edges_degree_au
AFTER UPDATE OF is_active, source_id, target_id ON edges BEGIN
    UPDATE nodes SET degree = (
        SELECT COUNT(*) FROM edges e
        WHERE e.is_active = 1 AND (e.source_id = nodes.id OR e.target_id = nodes.id)
    )
    WHERE id IN (OLD.source_id, OLD.target_id, NEW.source_id, NEW.target_id);
END;

CREATE TRIGGER IF NOT EXISTS edges_degree_ad AFTER DELETE ON edges BEGIN
    UPDATE nodes SET degree = (
        SELECT COUNT(*) FROM edges e
        WHERE e.is_active = 1 AND (e.source_id = nodes.id OR e.target_id = nodes.id)
    )
    WHERE id IN (OLD.source_id, OLD.target_id);
END;

-- updated_at maintenance when a writer did not set it explicitly
CREATE TRIGGER IF NOT EXISTS nodes_touch_au
AFTER UPDATE OF content, metadata, confidence, node_type, timestamp, is_pruned ON nodes
WHEN NEW.updated_at = OLD.updated_at BEGIN
    UPDATE nodes SET updated_at = strftime('%Y-%m-%dT%H:%M:%f000Z', 'now') WHERE id = NEW.id;
END;

CREATE TRIGGER IF NOT EXISTS edges_touch_au
AFTER UPDATE OF strength, context, weight, probability, bidirectional, is_active ON edges
WHEN NEW.updated_at = OLD.updated_at BEGIN
    UPDATE edges SET updated_at = strftime('%Y-%m-%dT%H:%M:%f000Z', 'now') WHERE id = NEW.id;
END;

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Spatial projection and sweep bookkeeping
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS spatial_index (
    node_id TEXT PRIMARY KEY REFERENCES nodes(id) ON DELETE CASCADE,
    node_type TEXT NOT NULL,
    min_x REAL NOT NULL,
    min_y REAL NOT NULL,
    min_z REAL NOT NULL,
    max_x REAL NOT NULL,
    max_y REAL NOT NULL,
    max_z REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_spatial_x ON spatial_index(min_x, max_x);

-- Last sweep timestamps and resumable cursors, keyed by name
CREATE TABLE IF NOT EXISTS maintenance_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Relations filled by optimize() and the audit trail
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS communities (
    id INTEGER PRIMARY KEY,
    size INTEGER NOT NULL,
    density REAL NOT NULL,
    members TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clusters (
    id INTEGER PRIMARY KEY,
    size INTEGER NOT NULL,
    average_strength REAL NOT NULL,
    members TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS detected_patterns (
    signature TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    target_type TEXT NOT NULL,
    occurrences INTEGER NOT NULL,
    example_edge_ids TEXT NOT NULL DEFAULT '[]',
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS graph_statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_count INTEGER NOT NULL,
    edge_count INTEGER NOT NULL,
    density REAL NOT NULL,
    average_degree REAL NOT NULL,
    average_clustering REAL NOT NULL,
    component_count INTEGER NOT NULL,
    community_count INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    action TEXT NOT NULL,
    detail TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_id, created_at);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // execute_batch handles multi-statement SQL including triggers
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
