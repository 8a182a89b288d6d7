//! One-hop backlinks.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::Result;
use crate::graph::Graph;
use crate::model::Edge;
use crate::query::{
    edge_type_allowed, edge_type_whitelist, resolve_identifier, Direction, NodeSummary,
};

#[derive(Debug, Clone, Serialize)]
pub struct BacklinksQuery {
    pub ident: String,
    pub direction: Direction,
    pub edge_types: Vec<String>,
}

impl BacklinksQuery {
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            direction: Direction::In,
            edge_types: Vec::new(),
        }
    }
}

/// A path of length one touching the query target.
#[derive(Debug, Clone, Serialize)]
pub struct Backlink {
    pub source: NodeSummary,
    pub target: NodeSummary,
    pub edge_type: String,
}

/// Edges touching the target, one hop only. Unresolved outgoing edges are
/// skipped when direction is `out`; results are deduplicated by
/// `(source_id, target_id)` and sorted by the source's `(type, key)`.
pub fn backlinks(graph: &Graph, query: &BacklinksQuery) -> Result<Vec<Backlink>> {
    let maps = graph.resolution_maps();
    let id = resolve_identifier(&maps, &query.ident)?;
    let whitelist = edge_type_whitelist(&query.edge_types);

    let mut candidates: Vec<&Edge> = Vec::new();
    if matches!(query.direction, Direction::In | Direction::Both) {
        candidates.extend(graph.incoming(&id));
    }
    if matches!(query.direction, Direction::Out | Direction::Both) {
        // Unresolved outgoing edges have no endpoint to emit.
        candidates.extend(graph.outgoing(&id).iter().filter(|e| e.to_id.is_some()));
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut results = Vec::new();
    for edge in candidates {
        if !edge_type_allowed(&whitelist, &edge.edge_type) {
            continue;
        }
        let to_id = match &edge.to_id {
            Some(to_id) => to_id,
            None => continue,
        };
        let (source, target) = match (graph.node(&edge.from_id), graph.node(to_id)) {
            (Some(s), Some(t)) => (s, t),
            _ => continue,
        };
        if !seen.insert((source.id.clone(), target.id.clone())) {
            continue;
        }
        results.push(Backlink {
            source: NodeSummary::from(source),
            target: NodeSummary::from(target),
            edge_type: edge.edge_type.clone(),
        });
    }

    results.sort_by(|a, b| {
        (&a.source.ty, &a.source.key, &a.target.ty, &a.target.key)
            .cmp(&(&b.source.ty, &b.source.key, &b.target.ty, &b.target.key))
    });
    Ok(results)
}
