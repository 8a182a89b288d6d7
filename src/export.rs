//! Deterministic JSON export of the index.
//!
//! Running the export twice on an unchanged index yields byte-identical
//! output: all three sections are emitted in their stable store order and
//! serialized with fixed field order.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::model::{RawTarget, Span};
use crate::store::Store;

#[derive(Debug, Serialize)]
pub struct ExportDoc {
    pub version: String,
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
    pub tags: Vec<ExportTag>,
}

/// Node attributes included in the export; file stats and hash are index
/// internals and stay out.
#[derive(Debug, Serialize)]
pub struct ExportNode {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub key: String,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ExportEdge {
    pub from_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    pub edge_type: String,
    pub raw_target: RawTarget,
    pub span: Span,
}

#[derive(Debug, Serialize)]
pub struct ExportTag {
    pub node_id: String,
    pub tag: String,
}

/// Assemble the export document: nodes sorted by `(type, key)`, edges by
/// `(from_id, edge_type, to_id, raw_target)`, tags by `(node_id, tag)`.
pub fn export_doc(store: &Store) -> Result<ExportDoc> {
    let nodes = store
        .nodes_sorted()?
        .into_iter()
        .map(|n| ExportNode {
            id: n.id,
            ty: n.ty,
            key: n.key,
            title: n.title,
            state: n.state,
            created: n.created,
            updated: n.updated,
            path: n.path,
        })
        .collect();
    let edges = store
        .edges_sorted_for_export()?
        .into_iter()
        .map(|e| ExportEdge {
            from_id: e.from_id,
            to_id: e.to_id,
            edge_type: e.edge_type,
            raw_target: e.raw_target,
            span: e.span,
        })
        .collect();
    let tags = store
        .tags_sorted()?
        .into_iter()
        .map(|(node_id, tag)| ExportTag { node_id, tag })
        .collect();
    Ok(ExportDoc {
        version: "1".to_string(),
        nodes,
        edges,
        tags,
    })
}

/// Serialize the export document to `writer`, with a trailing newline.
pub fn write_export(store: &Store, mut writer: impl Write) -> Result<()> {
    let doc = export_doc(store)?;
    serde_json::to_writer(&mut writer, &doc)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Export as an owned JSON string.
pub fn export_string(store: &Store) -> Result<String> {
    let mut buf = Vec::new();
    write_export(store, &mut buf)?;
    Ok(String::from_utf8(buf).expect("export is valid UTF-8"))
}
