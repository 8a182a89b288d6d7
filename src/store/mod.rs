//! Embedded relational store for the index.
//!
//! One [`Store`] owns one `rusqlite::Connection`; every operation owns its
//! connection lifecycle (no singletons). Mutation primitives come in pairs:
//! a public method that wraps the work in a transaction, and an `_inner`
//! function usable inside a caller-owned transaction (the incremental
//! indexer groups several primitives into one).

pub mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::model::{Diagnostic, Edge, Node, RawTarget, Severity, Span};
use crate::resolver::ResolutionMaps;

pub use schema::{migrate, schema_version, SCHEMA_VERSION};

/// One stored diagnostic. `node_id` is NULL for diagnostics on files that
/// never produced a node (missing or unparsable frontmatter).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiagnosticRow {
    pub node_id: Option<String>,
    pub path: String,
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
    pub created_at: String,
}

/// Handle over the index database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if absent) the index at `path` and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Schema version recorded in `meta`.
    pub fn schema_version(&self) -> Result<i64> {
        schema::schema_version(&self.conn)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // ── Mutation primitives ─────────────────────────────────────────────

    /// Insert a node by `id`, or update all non-key columns on conflict.
    pub fn upsert_node(&mut self, node: &Node) -> Result<()> {
        let tx = self.conn.transaction()?;
        upsert_node_inner(&tx, node)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace all tags of a node with `tags`.
    pub fn replace_tags_for_node(&mut self, node_id: &str, tags: &[String]) -> Result<()> {
        let tx = self.conn.transaction()?;
        replace_tags_inner(&tx, node_id, tags)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace all outgoing edges of `from_id` with `edges`.
    pub fn replace_edges_for_node(&mut self, from_id: &str, edges: &[Edge]) -> Result<()> {
        let tx = self.conn.transaction()?;
        replace_edges_inner(&tx, from_id, edges)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the diagnostics of a file (and its node, if any) with
    /// `diags`, stamping `created_at` with the current time.
    pub fn insert_diagnostics(
        &mut self,
        node_id: Option<&str>,
        path: &str,
        diags: &[Diagnostic],
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        insert_diagnostics_inner(&tx, node_id, path, diags, &now)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete the node indexed at `path`, cascading into its edges, tags,
    /// and diagnostics. Returns the deleted node id, if any.
    pub fn delete_node_by_path(&mut self, path: &str) -> Result<Option<String>> {
        let tx = self.conn.transaction()?;
        let deleted = delete_node_by_path_inner(&tx, path)?;
        tx.commit()?;
        Ok(deleted)
    }

    // ── Read helpers ────────────────────────────────────────────────────

    pub fn node_by_id(&self, id: &str) -> Result<Option<Node>> {
        self.conn
            .query_row(
                &format!("{NODE_COLUMNS} WHERE id = ?1"),
                [id],
                row_to_node,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn node_by_path(&self, path: &str) -> Result<Option<Node>> {
        self.conn
            .query_row(
                &format!("{NODE_COLUMNS} WHERE path = ?1"),
                [path],
                row_to_node,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All nodes ordered by `(type, key)`.
    pub fn nodes_sorted(&self) -> Result<Vec<Node>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_COLUMNS} ORDER BY type, key"))?;
        let rows = stmt.query_map([], row_to_node)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Tags of one node, sorted.
    pub fn tags_for_node(&self, node_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM tags WHERE node_id = ?1 ORDER BY tag")?;
        let rows = stmt.query_map([node_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// All `(node_id, tag)` pairs ordered by `(node_id, tag)`.
    pub fn tags_sorted(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT node_id, tag FROM tags ORDER BY node_id, tag")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// All edges. Rows whose `raw_target` or `span` fail to deserialize are
    /// skipped silently.
    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT from_id, to_id, edge_type, raw_target, span FROM edges")?;
        let rows = stmt.query_map([], row_to_edge_raw)?;
        let mut edges = Vec::new();
        for row in rows {
            let (from_id, to_id, edge_type, raw_target, span) = row?;
            match decode_edge(from_id, to_id, edge_type, &raw_target, &span) {
                Some(edge) => edges.push(edge),
                None => debug!("Skipping edge with undecodable raw_target/span"),
            }
        }
        Ok(edges)
    }

    /// Edges ordered for export: `(from_id, edge_type, to_id, raw_target)`.
    pub fn edges_sorted_for_export(&self) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_id, to_id, edge_type, raw_target, span FROM edges
             ORDER BY from_id, edge_type, to_id, raw_target",
        )?;
        let rows = stmt.query_map([], row_to_edge_raw)?;
        let mut edges = Vec::new();
        for row in rows {
            let (from_id, to_id, edge_type, raw_target, span) = row?;
            match decode_edge(from_id, to_id, edge_type, &raw_target, &span) {
                Some(edge) => edges.push(edge),
                None => debug!("Skipping edge with undecodable raw_target/span"),
            }
        }
        Ok(edges)
    }

    /// Diagnostics, optionally filtered by node and minimum severity,
    /// ordered by `(path, code, span)`.
    pub fn diagnostics(
        &self,
        node_id: Option<&str>,
        min_level: Option<Severity>,
    ) -> Result<Vec<DiagnosticRow>> {
        let mut sql = String::from(
            "SELECT node_id, path, level, code, message, span, created_at FROM diagnostics",
        );
        let mut clauses = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(id) = node_id {
            clauses.push(format!("node_id = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(id.to_string()));
        }
        if let Some(min) = min_level {
            let levels: Vec<String> = [Severity::Info, Severity::Warn, Severity::Error]
                .iter()
                .filter(|l| **l >= min)
                .map(|l| format!("'{}'", l.as_str()))
                .collect();
            clauses.push(format!("level IN ({})", levels.join(", ")));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY path, code, span");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (node_id, path, level, code, message, span, created_at) = row?;
            let severity = Severity::parse(&level).unwrap_or(Severity::Info);
            let span = span.and_then(|s| serde_json::from_str::<Span>(&s).ok());
            out.push(DiagnosticRow {
                node_id,
                path,
                diagnostic: Diagnostic {
                    severity,
                    code,
                    message,
                    span,
                },
                created_at,
            });
        }
        Ok(out)
    }

    /// Resolution maps over every indexed node.
    pub fn load_resolution_maps(&self) -> Result<ResolutionMaps> {
        load_resolution_maps_inner(&self.conn)
    }

    /// Node counts grouped by type, sorted.
    pub fn count_nodes_by_type(&self) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, COUNT(*) FROM nodes GROUP BY type")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (ty, count): (String, i64) = row?;
            out.insert(ty, count);
        }
        Ok(out)
    }

    /// Edge counts grouped by edge type, sorted.
    pub fn count_edges_by_type(&self) -> Result<BTreeMap<String, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT edge_type, COUNT(*) FROM edges GROUP BY edge_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (ty, count): (String, i64) = row?;
            out.insert(ty, count);
        }
        Ok(out)
    }
}

const NODE_COLUMNS: &str = "SELECT id, type, key, title, state, created, updated, path, \
                            mtime_ns, size_bytes, hash FROM nodes";

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        ty: row.get(1)?,
        key: row.get(2)?,
        title: row.get(3)?,
        state: row.get(4)?,
        created: row.get(5)?,
        updated: row.get(6)?,
        path: row.get(7)?,
        mtime_ns: row.get(8)?,
        size_bytes: row.get(9)?,
        hash: row.get(10)?,
    })
}

type RawEdgeRow = (String, Option<String>, String, String, String);

fn row_to_edge_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEdgeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_edge(
    from_id: String,
    to_id: Option<String>,
    edge_type: String,
    raw_target: &str,
    span: &str,
) -> Option<Edge> {
    let raw_target: RawTarget = serde_json::from_str(raw_target).ok()?;
    let span: Span = serde_json::from_str(span).ok()?;
    Some(Edge {
        from_id,
        to_id,
        edge_type,
        raw_target,
        span,
    })
}

// ── Transaction-free primitives ─────────────────────────────────────────
//
// These run without opening a transaction; callers compose them inside
// their own (the public `Store` methods above, the builder, the indexer).

/// Insert or update a node by `id`. Fails with `DUPLICATE_TYPE_KEY` when a
/// different node already owns the same `(type, key)`.
pub fn upsert_node_inner(conn: &Connection, node: &Node) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM nodes WHERE type = ?1 AND key = ?2",
            params![node.ty, node.key],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(existing) = existing {
        if existing != node.id {
            return Err(IndexError::DuplicateTypeKey {
                ty: node.ty.clone(),
                key: node.key.clone(),
                existing,
                conflicting: node.id.clone(),
            });
        }
    }

    conn.execute(
        "INSERT INTO nodes (id, type, key, title, state, created, updated, path, mtime_ns, size_bytes, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
             type = excluded.type,
             key = excluded.key,
             title = excluded.title,
             state = excluded.state,
             created = excluded.created,
             updated = excluded.updated,
             path = excluded.path,
             mtime_ns = excluded.mtime_ns,
             size_bytes = excluded.size_bytes,
             hash = excluded.hash",
        params![
            node.id,
            node.ty,
            node.key,
            node.title,
            node.state,
            node.created,
            node.updated,
            node.path,
            node.mtime_ns,
            node.size_bytes,
            node.hash,
        ],
    )?;
    Ok(())
}

/// Delete all tags of `node_id`, then insert each of `tags`.
pub fn replace_tags_inner(conn: &Connection, node_id: &str, tags: &[String]) -> Result<()> {
    conn.execute("DELETE FROM tags WHERE node_id = ?1", [node_id])?;
    let mut stmt = conn.prepare_cached("INSERT OR IGNORE INTO tags (node_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![node_id, tag])?;
    }
    Ok(())
}

/// Delete all outgoing edges of `from_id`, then insert each of `edges`.
/// `raw_target` and `span` are persisted in their canonical object form.
pub fn replace_edges_inner(conn: &Connection, from_id: &str, edges: &[Edge]) -> Result<()> {
    conn.execute("DELETE FROM edges WHERE from_id = ?1", [from_id])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO edges (from_id, to_id, edge_type, raw_target, span) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for edge in edges {
        stmt.execute(params![
            edge.from_id,
            edge.to_id,
            edge.edge_type,
            edge.raw_target.canonical(),
            edge.span.canonical(),
        ])?;
    }
    Ok(())
}

/// Delete prior diagnostics of the file (and of `node_id`, when the note
/// has one), then insert `diags` stamped with `created_at`. `node_id` is
/// `None` for files that parsed without a usable identity.
pub fn insert_diagnostics_inner(
    conn: &Connection,
    node_id: Option<&str>,
    path: &str,
    diags: &[Diagnostic],
    created_at: &str,
) -> Result<()> {
    // `node_id = NULL` never matches, so the second arm only fires for
    // identified notes (covering rows left under a previous path).
    conn.execute(
        "DELETE FROM diagnostics WHERE path = ?1 OR node_id = ?2",
        params![path, node_id],
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO diagnostics (node_id, path, level, code, message, span, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for diag in diags {
        stmt.execute(params![
            node_id,
            path,
            diag.severity.as_str(),
            diag.code,
            diag.message,
            diag.span.as_ref().map(|s| s.canonical()),
            created_at,
        ])?;
    }
    Ok(())
}

/// Resolution maps over every indexed node (connection-level, usable
/// inside a caller-owned transaction).
pub fn load_resolution_maps_inner(conn: &Connection) -> Result<ResolutionMaps> {
    let mut stmt = conn.prepare("SELECT id, type, key FROM nodes")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    let mut maps = ResolutionMaps::default();
    for row in rows {
        let (id, ty, key) = row?;
        maps.insert(&ty, &key, &id);
    }
    Ok(maps)
}

/// Delete the node at `path`, if any. Cascades drop its edges, tags, and
/// node-attached diagnostics; path-keyed diagnostics for the file are
/// removed explicitly (they have no node to cascade from).
pub fn delete_node_by_path_inner(conn: &Connection, path: &str) -> Result<Option<String>> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM nodes WHERE path = ?1", [path], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(ref id) = id {
        conn.execute("DELETE FROM nodes WHERE id = ?1", [id])?;
    }
    conn.execute("DELETE FROM diagnostics WHERE path = ?1", [path])?;
    Ok(id)
}
