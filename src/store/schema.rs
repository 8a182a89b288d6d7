//! On-disk schema, version 1.
//!
//! The SQL here is the single source of truth for the index layout. The
//! ordering contracts (export, graph loader) depend on the declared column
//! types using SQLite's BINARY collation; do not add COLLATE clauses.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{IndexError, Result};

/// The only shipped schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Per-connection pragmas. Foreign-key enforcement is always on: node
/// deletion must cascade into edges, tags, and diagnostics.
pub const PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
";

/// Schema v1. `edges.to_id` is NULL iff the link does not resolve.
/// Deleting a node drops its outgoing edges; incoming edges survive with
/// `to_id` set NULL (the target is gone, so the link is unresolved again,
/// and it stays that way until the owning note is reindexed.
///
/// Diagnostics are keyed by the source file's path; `node_id` is NULL for
/// files whose frontmatter yields no usable identity, so their parse
/// diagnostics still surface even though no node exists.
pub const SCHEMA: &str = "
    CREATE TABLE meta (
        schema_version INTEGER PRIMARY KEY,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    );
    CREATE TABLE nodes (
        id         TEXT PRIMARY KEY,
        type       TEXT NOT NULL,
        key        TEXT NOT NULL,
        title      TEXT,
        state      TEXT,
        created    TEXT,
        updated    TEXT,
        path       TEXT NOT NULL,
        mtime_ns   INTEGER NOT NULL,
        size_bytes INTEGER NOT NULL,
        hash       TEXT,
        UNIQUE (type, key)
    );
    CREATE TABLE edges (
        from_id    TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        to_id      TEXT REFERENCES nodes(id) ON DELETE SET NULL,
        edge_type  TEXT NOT NULL,
        raw_target TEXT NOT NULL,
        span       TEXT NOT NULL,
        PRIMARY KEY (from_id, to_id, edge_type, raw_target, span)
    );
    CREATE TABLE tags (
        node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        tag     TEXT NOT NULL,
        PRIMARY KEY (node_id, tag)
    );
    CREATE TABLE diagnostics (
        node_id    TEXT REFERENCES nodes(id) ON DELETE CASCADE,
        path       TEXT NOT NULL,
        level      TEXT NOT NULL,
        code       TEXT NOT NULL,
        message    TEXT NOT NULL,
        span       TEXT,
        created_at TEXT NOT NULL
    );
";

pub const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_edges_from_id ON edges(from_id);
    CREATE INDEX IF NOT EXISTS idx_edges_to_id ON edges(to_id);
    CREATE INDEX IF NOT EXISTS idx_edges_edge_type ON edges(edge_type);
    CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
    CREATE INDEX IF NOT EXISTS idx_nodes_state ON nodes(state);
    CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);
    CREATE INDEX IF NOT EXISTS idx_diagnostics_node ON diagnostics(node_id, level, code);
    CREATE INDEX IF NOT EXISTS idx_diagnostics_path ON diagnostics(path);
";

/// Apply migrations to a connection.
///
/// Fresh databases get schema v1 in a single transaction. Existing
/// databases are version-checked: newer than supported fails with
/// `SCHEMA_VERSION_UNSUPPORTED`, older with `MIGRATION_REQUIRED`.
/// Idempotent once v1 is in place.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)?;

    let has_meta: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'meta'")?
        .exists([])?;

    if !has_meta {
        info!(version = SCHEMA_VERSION, "Creating index schema");
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.execute(
            "INSERT INTO meta (schema_version, created_at, updated_at) VALUES (?1, ?2, ?2)",
            rusqlite::params![SCHEMA_VERSION, now],
        )?;
        tx.execute_batch(INDEXES)?;
        tx.commit()?;
        return Ok(());
    }

    let found: i64 = conn.query_row("SELECT MAX(schema_version) FROM meta", [], |row| row.get(0))?;
    debug!(found, supported = SCHEMA_VERSION, "Index schema present");
    if found > SCHEMA_VERSION {
        return Err(IndexError::SchemaVersionUnsupported {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found < SCHEMA_VERSION {
        return Err(IndexError::MigrationRequired {
            found,
            supported: SCHEMA_VERSION,
        });
    }
    conn.execute_batch(INDEXES)?;
    Ok(())
}

/// Current schema version recorded in `meta`.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT MAX(schema_version) FROM meta", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_fresh_then_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);
        migrate(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 1);
        let meta_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(meta_rows, 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO meta (schema_version, created_at, updated_at) VALUES (2, 'x', 'x')",
            [],
        )
        .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VERSION_UNSUPPORTED");
    }

    #[test]
    fn test_older_schema_requires_migration() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute("DELETE FROM meta", []).unwrap();
        conn.execute(
            "INSERT INTO meta (schema_version, created_at, updated_at) VALUES (0, 'x', 'x')",
            [],
        )
        .unwrap();
        let err = migrate(&mut conn).unwrap_err();
        assert_eq!(err.code(), "MIGRATION_REQUIRED");
    }
}
