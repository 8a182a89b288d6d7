//! Incremental index updates: one watcher event, one transaction.
//!
//! Resolution maps are re-read from the live index on every event, so an
//! update reflects the current state of other notes; bulk reconciliation
//! of stale cross-references remains the full rebuild's job.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::builder::mtime_ns;
use crate::config::VaultConfig;
use crate::error::Result;
use crate::model::Node;
use crate::parser::parse_note;
use crate::resolver::resolve_links;
use crate::store::{
    delete_node_by_path_inner, insert_diagnostics_inner, load_resolution_maps_inner,
    replace_edges_inner, replace_tags_inner, upsert_node_inner, Store,
};
use crate::watcher::{NoteEvent, Op};

/// What an applied event did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Node upserted along with its tags, edges, and diagnostics.
    Updated(String),
    /// Node removed; cascades dropped its edges, tags, and diagnostics.
    Deleted(String),
    /// No node changed: unchanged file, unindexable note (only its
    /// file-level diagnostics are refreshed), or unknown path.
    Unchanged,
    /// Op carries no indexing meaning (e.g. chmod).
    Skipped,
}

/// Apply exactly one event to the live index.
///
/// The whole update runs in a single transaction; on error it rolls back
/// and the live index is unchanged.
pub fn apply_event(cfg: &VaultConfig, event: &NoteEvent) -> Result<IndexOutcome> {
    let mut store = Store::open(cfg.index_path())?;
    let tx = store.conn_mut().transaction()?;
    let outcome = match event.op {
        Op::Create | Op::Write => apply_write(&tx, &event.path)?,
        Op::Delete => apply_delete(&tx, &event.path)?,
        Op::Other => IndexOutcome::Skipped,
    };
    tx.commit()?;
    debug!(path = %event.path.display(), ?outcome, "Applied event");
    Ok(outcome)
}

fn apply_write(conn: &Connection, path: &Path) -> Result<IndexOutcome> {
    // The file may be gone by the time the debounced event arrives.
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return apply_delete(conn, path),
        Err(e) => return Err(e.into()),
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return apply_delete(conn, path),
        Err(e) => return Err(e.into()),
    };

    let path_str = path.to_string_lossy().into_owned();
    let note = parse_note(&path_str, &bytes);
    let Some((id, ty, key)) = note.identity() else {
        // The file is not indexable, but its file-level diagnostics
        // (missing or unparsable frontmatter) are still recorded.
        let now = chrono::Utc::now().to_rfc3339();
        insert_diagnostics_inner(conn, None, &note.path, &note.diagnostics, &now)?;
        return Ok(IndexOutcome::Unchanged);
    };
    let (id, ty, key) = (id.to_string(), ty.to_string(), key.to_string());

    let node = Node {
        id: id.clone(),
        ty,
        key,
        title: note.frontmatter.title.clone(),
        state: note.frontmatter.state.clone(),
        created: note.frontmatter.created.clone(),
        updated: note.frontmatter.updated.clone(),
        path: path_str,
        mtime_ns: mtime_ns(&meta),
        size_bytes: meta.len() as i64,
        hash: Some(blake3::hash(&bytes).to_hex().to_string()),
    };

    // Short-circuit: identical stats mean the indexed content is current.
    let existing: Option<(i64, i64, String)> = conn
        .query_row(
            "SELECT mtime_ns, size_bytes, path FROM nodes WHERE id = ?1",
            [&node.id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    if let Some((mtime, size, stored_path)) = existing {
        if mtime == node.mtime_ns && size == node.size_bytes && stored_path == node.path {
            return Ok(IndexOutcome::Unchanged);
        }
    }

    upsert_node_inner(conn, &node)?;
    replace_tags_inner(conn, &id, &note.frontmatter.tags)?;

    let maps = load_resolution_maps_inner(conn)?;
    let (edges, resolution_diags) = resolve_links(&id, &note.links, &maps);
    replace_edges_inner(conn, &id, &edges)?;

    let mut union = note.diagnostics.clone();
    union.extend(resolution_diags);
    let now = chrono::Utc::now().to_rfc3339();
    insert_diagnostics_inner(conn, Some(&id), &node.path, &union, &now)?;

    Ok(IndexOutcome::Updated(id))
}

fn apply_delete(conn: &Connection, path: &Path) -> Result<IndexOutcome> {
    let path_str = path.to_string_lossy();
    match delete_node_by_path_inner(conn, &path_str)? {
        Some(id) => Ok(IndexOutcome::Deleted(id)),
        None => Ok(IndexOutcome::Unchanged),
    }
}
