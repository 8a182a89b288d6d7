//! Index statistics: node and edge counts grouped by type.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct VaultStats {
    pub total_nodes: i64,
    pub total_edges: i64,
    pub nodes_by_type: BTreeMap<String, i64>,
    pub edges_by_type: BTreeMap<String, i64>,
}

/// Collect counts from the index.
pub fn collect(store: &Store) -> Result<VaultStats> {
    let nodes_by_type = store.count_nodes_by_type()?;
    let edges_by_type = store.count_edges_by_type()?;
    Ok(VaultStats {
        total_nodes: nodes_by_type.values().sum(),
        total_edges: edges_by_type.values().sum(),
        nodes_by_type,
        edges_by_type,
    })
}
