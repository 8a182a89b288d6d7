//! BFS primitives over adjacency closures.
//!
//! The closure yields successor ids; direction and edge-type filtering
//! happen in the caller. The visited set is mandatory because graphs may
//! contain cycles; a node is recorded at its earliest discovery depth only.
//! Traversal is cooperative: the cancellation flag is polled once per
//! layer.

use std::collections::{HashSet, VecDeque};

use crate::cancel::CancelFlag;
use crate::error::Result;

/// Breadth-first layers from `root` up to `max_depth` hops.
///
/// Layer 0 is the root; layer k holds the nodes newly reached at hop k, in
/// discovery order. Already-visited nodes are never re-traversed.
pub fn bfs_layers<F>(
    root: &str,
    max_depth: u32,
    cancel: &CancelFlag,
    mut successors: F,
) -> Result<Vec<Vec<String>>>
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut layers: Vec<Vec<String>> = vec![vec![root.to_string()]];
    let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
    let mut frontier: VecDeque<String> = VecDeque::from([root.to_string()]);

    for _depth in 1..=max_depth {
        cancel.check()?;
        let mut next_layer = Vec::new();
        let mut next_frontier = VecDeque::new();
        while let Some(id) = frontier.pop_front() {
            for succ in successors(&id) {
                if visited.insert(succ.clone()) {
                    next_layer.push(succ.clone());
                    next_frontier.push_back(succ);
                }
            }
        }
        if next_layer.is_empty() {
            break;
        }
        layers.push(next_layer);
        frontier = next_frontier;
    }
    Ok(layers)
}
