//! In-memory materialization of the index graph.
//!
//! Read-only: nodes keyed by id, outgoing edges keyed by `from_id`,
//! incoming edges keyed by `to_id` (resolved edges only). Adjacency lists
//! are sorted deterministically so traversal output is reproducible.

pub mod traversal;

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::{Edge, Node};
use crate::resolver::ResolutionMaps;
use crate::store::Store;

/// The loaded graph. Edges appear in both adjacency maps when resolved;
/// unresolved edges only appear on the outgoing side.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    outgoing: HashMap<String, Vec<Edge>>,
    incoming: HashMap<String, Vec<Edge>>,
    tags: HashMap<String, Vec<String>>,
}

impl Graph {
    /// Materialize the whole index.
    pub fn load(store: &Store) -> Result<Self> {
        let nodes = store.nodes_sorted()?;
        let edges = store.all_edges()?;
        let tag_rows = store.tags_sorted()?;
        Ok(Self::assemble(nodes, edges, tag_rows))
    }

    /// Materialize the subgraph induced by `ids`: nodes restricted to the
    /// set, edges where either endpoint is in the set.
    pub fn load_subgraph(store: &Store, ids: &HashSet<String>) -> Result<Self> {
        let nodes = store
            .nodes_sorted()?
            .into_iter()
            .filter(|n| ids.contains(&n.id))
            .collect();
        let edges = store
            .all_edges()?
            .into_iter()
            .filter(|e| {
                ids.contains(&e.from_id)
                    || e.to_id.as_ref().map(|t| ids.contains(t)).unwrap_or(false)
            })
            .collect();
        let tag_rows = store
            .tags_sorted()?
            .into_iter()
            .filter(|(node_id, _)| ids.contains(node_id))
            .collect();
        Ok(Self::assemble(nodes, edges, tag_rows))
    }

    fn assemble(nodes: Vec<Node>, edges: Vec<Edge>, tag_rows: Vec<(String, String)>) -> Self {
        let mut graph = Graph::default();
        for node in nodes {
            graph.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            if let Some(to_id) = &edge.to_id {
                graph
                    .incoming
                    .entry(to_id.clone())
                    .or_default()
                    .push(edge.clone());
            }
            graph
                .outgoing
                .entry(edge.from_id.clone())
                .or_default()
                .push(edge);
        }
        for list in graph.outgoing.values_mut() {
            sort_adjacency(list);
        }
        for list in graph.incoming.values_mut() {
            sort_adjacency(list);
        }
        for (node_id, tag) in tag_rows {
            graph.tags.entry(node_id).or_default().push(tag);
        }
        graph
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Outgoing edges of `id`, sorted.
    pub fn outgoing(&self, id: &str) -> &[Edge] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    /// Incoming (resolved) edges of `id`, sorted.
    pub fn incoming(&self, id: &str) -> &[Edge] {
        self.incoming.get(id).map_or(&[], Vec::as_slice)
    }

    /// Tags of `id`, sorted.
    pub fn tags(&self, id: &str) -> &[String] {
        self.tags.get(id).map_or(&[], Vec::as_slice)
    }

    /// Lookup maps over the loaded node identities, for query-time
    /// identifier resolution.
    pub fn resolution_maps(&self) -> ResolutionMaps {
        let mut maps = ResolutionMaps::new();
        for node in self.nodes.values() {
            maps.insert(&node.ty, &node.key, &node.id);
        }
        maps
    }
}

/// Deterministic adjacency order: `(edge_type, to_id with NULL last,
/// raw_target, span)`, the last two compared in canonical serialized form.
fn sort_adjacency(edges: &mut [Edge]) {
    edges.sort_by_key(|e| {
        (
            e.edge_type.clone(),
            e.to_id.is_none(),
            e.to_id.clone().unwrap_or_default(),
            e.raw_target.canonical(),
            e.span.canonical(),
        )
    });
}
