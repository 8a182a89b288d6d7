//! BFS shortest paths from a source to each destination.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::cancel::CancelFlag;
use crate::error::{IndexError, Result};
use crate::graph::Graph;
use crate::query::{resolve_identifier, type_key_of, NodeSummary};

/// Default cap on emitted paths.
pub const DEFAULT_MAX_PATHS: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct PathsQuery {
    pub source: String,
    pub destinations: Vec<String>,
    pub max_depth: u32,
    pub max_paths: u32,
}

impl PathsQuery {
    pub fn new(source: impl Into<String>, destinations: Vec<String>, max_depth: u32) -> Self {
        Self {
            source: source.into(),
            destinations,
            max_depth,
            max_paths: DEFAULT_MAX_PATHS,
        }
    }
}

/// One traversed edge along a path.
#[derive(Debug, Clone, Serialize)]
pub struct PathEdge {
    pub from_id: String,
    pub to_id: String,
    pub edge_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    pub destination: NodeSummary,
    pub hop_count: u32,
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<PathEdge>,
}

struct PathState {
    nodes: Vec<String>,
    edges: Vec<PathEdge>,
}

/// Enumerate shortest paths from the source to each destination.
///
/// Cycle control is per-path: a node never appears twice on the same path,
/// but distinct paths may share nodes. Unresolved outgoing edges are never
/// traversed. Enumeration stops at `max_depth` hops or once `max_paths`
/// paths have been emitted, whichever comes first; `max_paths = 0` means
/// no paths. Cancellation is polled per dequeued path.
pub fn paths(graph: &Graph, query: &PathsQuery, cancel: &CancelFlag) -> Result<Vec<PathResult>> {
    if query.max_depth == 0 {
        return Err(IndexError::InvalidArgument(
            "max_depth is required and must be > 0".to_string(),
        ));
    }
    let maps = graph.resolution_maps();
    let source = resolve_identifier(&maps, &query.source)?;
    let mut destinations: HashSet<String> = HashSet::new();
    for ident in &query.destinations {
        destinations.insert(resolve_identifier(&maps, ident)?);
    }

    let mut results: Vec<(Vec<String>, PathResult)> = Vec::new();
    if query.max_paths == 0 {
        return Ok(Vec::new());
    }
    let cap = query.max_paths as usize;

    // Depth at which each destination was first reached; later (longer)
    // arrivals at the same destination are not emitted.
    let mut first_depth: HashMap<String, u32> = HashMap::new();

    if destinations.contains(&source) {
        first_depth.insert(source.clone(), 0);
        results.push(make_result(graph, &source, vec![source.clone()], Vec::new()));
    }

    let mut queue: VecDeque<PathState> = VecDeque::new();
    queue.push_back(PathState {
        nodes: vec![source.clone()],
        edges: Vec::new(),
    });

    'bfs: while let Some(state) = queue.pop_front() {
        cancel.check()?;
        if results.len() >= cap {
            break;
        }
        let depth = (state.nodes.len() - 1) as u32;
        if depth >= query.max_depth {
            continue;
        }
        let last = state.nodes.last().expect("path is never empty").clone();
        for edge in graph.outgoing(&last) {
            let next = match &edge.to_id {
                Some(next) => next.clone(),
                None => continue,
            };
            if state.nodes.contains(&next) {
                continue;
            }
            let mut nodes = state.nodes.clone();
            nodes.push(next.clone());
            let mut edges = state.edges.clone();
            edges.push(PathEdge {
                from_id: last.clone(),
                to_id: next.clone(),
                edge_type: edge.edge_type.clone(),
            });
            let reached = depth + 1;

            if destinations.contains(&next) {
                let shortest = *first_depth.entry(next.clone()).or_insert(reached);
                if shortest == reached {
                    results.push(make_result(graph, &next, nodes.clone(), edges.clone()));
                    if results.len() >= cap {
                        break 'bfs;
                    }
                }
            }
            queue.push_back(PathState { nodes, edges });
        }
    }

    // Group by destination (type, key), then order paths within a
    // destination by their node-id sequence.
    results.sort_by(|(a_ids, a), (b_ids, b)| {
        let a_key = type_key_of(graph, &a.destination.id);
        let b_key = type_key_of(graph, &b.destination.id);
        a_key.cmp(&b_key).then_with(|| a_ids.cmp(b_ids))
    });
    Ok(results.into_iter().map(|(_, r)| r).collect())
}

fn make_result(
    graph: &Graph,
    destination: &str,
    node_ids: Vec<String>,
    edges: Vec<PathEdge>,
) -> (Vec<String>, PathResult) {
    let nodes: Vec<NodeSummary> = node_ids
        .iter()
        .filter_map(|id| graph.node(id))
        .map(NodeSummary::from)
        .collect();
    let destination = graph
        .node(destination)
        .map(NodeSummary::from)
        .unwrap_or(NodeSummary {
            id: destination.to_string(),
            ty: String::new(),
            key: String::new(),
            title: None,
        });
    let hop_count = edges.len() as u32;
    (
        node_ids,
        PathResult {
            destination,
            hop_count,
            nodes,
            edges,
        },
    )
}
