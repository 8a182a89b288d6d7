//! BFS neighbors by depth.

use serde::Serialize;

use crate::cancel::CancelFlag;
use crate::error::{IndexError, Result};
use crate::graph::traversal::bfs_layers;
use crate::graph::Graph;
use crate::query::{
    edge_type_allowed, edge_type_whitelist, resolve_identifier, Direction, NodeFilter, NodeInfo,
};

#[derive(Debug, Clone, Serialize)]
pub struct NeighborsQuery {
    pub ident: String,
    pub max_depth: u32,
    pub direction: Direction,
    pub edge_types: Vec<String>,
    #[serde(flatten)]
    pub filter: NodeFilter,
}

impl NeighborsQuery {
    pub fn new(ident: impl Into<String>, max_depth: u32) -> Self {
        Self {
            ident: ident.into(),
            max_depth,
            direction: Direction::Out,
            edge_types: Vec::new(),
            filter: NodeFilter::default(),
        }
    }
}

/// Nodes newly reached at one hop depth, sorted by `(type, key)`.
#[derive(Debug, Clone, Serialize)]
pub struct DepthLayer {
    pub depth: u32,
    pub nodes: Vec<NodeInfo>,
}

/// BFS from the root, emitting a per-depth list of nodes. Depth 0 is the
/// root itself. A node is recorded at its earliest discovery depth and not
/// re-traversed; unresolved outgoing edges are never followed. The
/// post-filter drops nodes from the output (layers left empty are
/// omitted) without affecting traversal. Cancellation is polled per layer.
pub fn neighbors(
    graph: &Graph,
    query: &NeighborsQuery,
    cancel: &CancelFlag,
) -> Result<Vec<DepthLayer>> {
    if query.max_depth == 0 {
        return Err(IndexError::InvalidArgument(
            "max_depth is required and must be > 0".to_string(),
        ));
    }
    let maps = graph.resolution_maps();
    let root = resolve_identifier(&maps, &query.ident)?;
    let whitelist = edge_type_whitelist(&query.edge_types);

    let direction = query.direction;
    let layers = bfs_layers(&root, query.max_depth, cancel, |id| {
        let mut next = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            for edge in graph.outgoing(id) {
                if !edge_type_allowed(&whitelist, &edge.edge_type) {
                    continue;
                }
                if let Some(to_id) = &edge.to_id {
                    next.push(to_id.clone());
                }
            }
        }
        if matches!(direction, Direction::In | Direction::Both) {
            for edge in graph.incoming(id) {
                if !edge_type_allowed(&whitelist, &edge.edge_type) {
                    continue;
                }
                next.push(edge.from_id.clone());
            }
        }
        next
    })?;

    let mut out = Vec::new();
    for (depth, ids) in layers.into_iter().enumerate() {
        let mut nodes: Vec<NodeInfo> = ids
            .iter()
            .filter_map(|id| graph.node(id))
            .filter(|node| {
                query.filter.is_empty() || query.filter.matches(node, graph.tags(&node.id))
            })
            .map(|node| NodeInfo::from_node(node, graph.tags(&node.id).to_vec()))
            .collect();
        if nodes.is_empty() {
            continue;
        }
        nodes.sort_by(|a, b| (&a.ty, &a.key).cmp(&(&b.ty, &b.key)));
        out.push(DepthLayer {
            depth: depth as u32,
            nodes,
        });
    }
    Ok(out)
}
