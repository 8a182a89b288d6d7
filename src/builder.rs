//! Full atomic rebuild of the index.
//!
//! The rebuild writes into `index.db.tmp` and renames it over the live
//! index only after both passes complete. The rename is the linearization
//! point: readers holding the old file keep their snapshot, and a failed
//! rebuild leaves the live index untouched.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::config::VaultConfig;
use crate::error::{IndexError, Result};
use crate::model::Node;
use crate::parser::{parse_note, ParsedNote};
use crate::resolver::{resolve_links, ResolutionMaps};
use crate::store::{
    insert_diagnostics_inner, replace_edges_inner, replace_tags_inner, upsert_node_inner, Store,
};

/// Counters reported by a completed rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Notes indexed with a full identity.
    pub indexed: usize,
    /// Files skipped: unreadable, or carrying a conflicting identity.
    pub skipped: usize,
    /// Parsed files without a complete `(id, type, key)` identity.
    pub unindexable: usize,
}

/// File facts captured at read time, persisted on the node.
struct FileFacts {
    mtime_ns: i64,
    size_bytes: i64,
    hash: String,
}

/// Rebuild the whole index from the vault.
pub fn rebuild(cfg: &VaultConfig, cancel: &CancelFlag) -> Result<BuildStats> {
    let state_dir = cfg.state_dir_path();
    std::fs::create_dir_all(&state_dir)?;

    let tmp_path = cfg.tmp_index_path();
    if tmp_path.exists() {
        debug!(path = %tmp_path.display(), "Removing stale temporary index");
        std::fs::remove_file(&tmp_path)?;
    }

    info!(vault = %cfg.root.display(), "Starting full rebuild");
    match build_into(cfg, &tmp_path, cancel) {
        Ok(stats) => {
            std::fs::rename(&tmp_path, cfg.index_path())?;
            info!(
                indexed = stats.indexed,
                skipped = stats.skipped,
                unindexable = stats.unindexable,
                "Rebuild complete"
            );
            Ok(stats)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

/// Build a fresh index into `tmp_path`. The temporary store is closed on
/// return so the caller can rename it.
fn build_into(cfg: &VaultConfig, tmp_path: &Path, cancel: &CancelFlag) -> Result<BuildStats> {
    let mut store = Store::open(tmp_path)?;
    let mut stats = BuildStats::default();

    let files = discover_note_files(cfg)?;
    debug!(count = files.len(), "Discovered note files");
    cancel.check()?;

    // Read and parse in parallel; writes stay serial below.
    let parsed: Vec<Option<(ParsedNote, FileFacts)>> = files
        .par_iter()
        .map(|path| {
            if cancel.is_cancelled() {
                return None;
            }
            read_and_parse(path)
        })
        .collect();
    cancel.check()?;

    let created_at = chrono::Utc::now().to_rfc3339();

    // Pass 1: identities, nodes, tags, parse diagnostics.
    let mut maps = ResolutionMaps::new();
    let mut notes: Vec<(String, ParsedNote)> = Vec::new();
    {
        let tx = store.conn_mut().transaction()?;
        for entry in parsed {
            cancel.check()?;
            let (note, facts) = match entry {
                Some(pair) => pair,
                None => {
                    stats.skipped += 1;
                    continue;
                }
            };
            let Some((id, ty, key)) = note.identity() else {
                // No node to attach to, but the file-level diagnostics
                // (missing or unparsable frontmatter) still get recorded.
                if !note.diagnostics.is_empty() {
                    insert_diagnostics_inner(&tx, None, &note.path, &note.diagnostics, &created_at)?;
                }
                stats.unindexable += 1;
                continue;
            };
            let (id, ty, key) = (id.to_string(), ty.to_string(), key.to_string());

            let node = Node {
                id: id.clone(),
                ty: ty.clone(),
                key: key.clone(),
                title: note.frontmatter.title.clone(),
                state: note.frontmatter.state.clone(),
                created: note.frontmatter.created.clone(),
                updated: note.frontmatter.updated.clone(),
                path: note.path.clone(),
                mtime_ns: facts.mtime_ns,
                size_bytes: facts.size_bytes,
                hash: Some(facts.hash),
            };
            match upsert_node_inner(&tx, &node) {
                Ok(()) => {}
                Err(e @ IndexError::DuplicateTypeKey { .. }) => {
                    warn!(path = %note.path, "Skipping note with conflicting identity: {e}");
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
            replace_tags_inner(&tx, &id, &note.frontmatter.tags)?;
            insert_diagnostics_inner(&tx, Some(&id), &note.path, &note.diagnostics, &created_at)?;

            maps.insert(&ty, &key, &id);
            notes.push((id, note));
            stats.indexed += 1;
        }
        tx.commit()?;
    }
    cancel.check()?;

    // Pass 2: resolve links, replace edges, re-insert the diagnostic union.
    {
        let tx = store.conn_mut().transaction()?;
        for (id, note) in &notes {
            cancel.check()?;
            let (edges, resolution_diags) = resolve_links(id, &note.links, &maps);
            replace_edges_inner(&tx, id, &edges)?;
            if !resolution_diags.is_empty() {
                let mut union = note.diagnostics.clone();
                union.extend(resolution_diags);
                insert_diagnostics_inner(&tx, Some(id), &note.path, &union, &created_at)?;
            }
        }
        tx.commit()?;
    }

    Ok(stats)
}

/// Discover note files under the configured type directories, in sorted
/// order. Non-directories among the type entries are skipped.
fn discover_note_files(cfg: &VaultConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for ty in &cfg.types {
        let dir = cfg.type_dir(ty);
        if !dir.is_dir() {
            debug!(ty, "Type directory missing, skipping");
            continue;
        }
        let walk = WalkBuilder::new(&dir)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();
        for entry in walk {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Walk error under {}: {e}", dir.display());
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && cfg.is_note_path(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Read and parse one file. Unreadable files contribute nothing to the
/// index and are skipped without a diagnostic.
fn read_and_parse(path: &Path) -> Option<(ParsedNote, FileFacts)> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %path.display(), "Skipping unreadable file: {e}");
            return None;
        }
    };
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), "Skipping unreadable file: {e}");
            return None;
        }
    };
    let facts = FileFacts {
        mtime_ns: mtime_ns(&meta),
        size_bytes: meta.len() as i64,
        hash: blake3::hash(&bytes).to_hex().to_string(),
    };
    let path_str = path.to_string_lossy().into_owned();
    Some((parse_note(&path_str, &bytes), facts))
}

/// Modification time in nanoseconds since the epoch.
pub(crate) fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
