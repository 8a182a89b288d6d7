//! Read-only queries over the index.
//!
//! All queries are synchronous and deterministic. Failures are values
//! carrying a stable code (`NODE_NOT_FOUND`, `AMBIGUOUS_IDENTIFIER`,
//! `INVALID_ARGUMENT`); partial result sets are never emitted alongside
//! errors.

pub mod backlinks;
pub mod neighbors;
pub mod paths;
pub mod search;

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::model::Node;
use crate::resolver::{KeyMatch, ResolutionMaps};

pub use backlinks::{backlinks, Backlink, BacklinksQuery};
pub use neighbors::{neighbors, DepthLayer, NeighborsQuery};
pub use paths::{paths, PathEdge, PathResult, PathsQuery, DEFAULT_MAX_PATHS};
pub use search::{search, SearchQuery};

/// Version stamped on every query response.
pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// Envelope around a query's results: the schema version, the echoed
/// query, and the payload.
#[derive(Debug, Serialize)]
pub struct Response<Q: Serialize, R: Serialize> {
    pub schema_version: u32,
    pub query: Q,
    pub results: R,
}

impl<Q: Serialize, R: Serialize> Response<Q, R> {
    pub fn new(query: Q, results: R) -> Self {
        Self {
            schema_version: RESPONSE_SCHEMA_VERSION,
            query,
            results,
        }
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            other => Err(IndexError::InvalidArgument(format!(
                "Direction must be 'in', 'out', or 'both', got '{other}'"
            ))),
        }
    }
}

/// Tag filter mode: every tag must match, or any one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    #[default]
    All,
    Any,
}

/// Attribute filter shared by Search and the Neighbors post-filter. Empty
/// sets mean "no constraint".
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeFilter {
    pub types: Vec<String>,
    pub states: Vec<String>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
}

impl NodeFilter {
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.states.is_empty() && self.tags.is_empty()
    }

    /// In-memory evaluation against a node and its tag set.
    pub fn matches(&self, node: &Node, tags: &[String]) -> bool {
        if !self.types.is_empty() && !self.types.iter().any(|t| *t == node.ty) {
            return false;
        }
        if !self.states.is_empty() {
            match &node.state {
                Some(state) if self.states.iter().any(|s| s == state) => {}
                _ => return false,
            }
        }
        if !self.tags.is_empty() {
            let have: HashSet<&str> = tags.iter().map(String::as_str).collect();
            let ok = match self.tag_match {
                TagMatch::All => self.tags.iter().all(|t| have.contains(t.as_str())),
                TagMatch::Any => self.tags.iter().any(|t| have.contains(t.as_str())),
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

/// Node identity echoed in query results.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            ty: node.ty.clone(),
            key: node.key.clone(),
            title: node.title.clone(),
        }
    }
}

/// Full node attributes plus the tag set, as emitted by Search and the
/// Neighbors layers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub key: String,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub path: String,
    pub tags: Vec<String>,
}

impl NodeInfo {
    pub fn from_node(node: &Node, tags: Vec<String>) -> Self {
        Self {
            id: node.id.clone(),
            ty: node.ty.clone(),
            key: node.key.clone(),
            title: node.title.clone(),
            state: node.state.clone(),
            created: node.created.clone(),
            updated: node.updated.clone(),
            path: node.path.clone(),
            tags,
        }
    }
}

/// Resolve a node identifier string to a node id.
///
/// `type:key` is an exact lookup; a bare `key` is matched exactly across
/// all types, falling back to last-segment matching with the same
/// cardinality semantics. More than one `:` is a formatting error.
pub fn resolve_identifier(maps: &ResolutionMaps, ident: &str) -> Result<String> {
    if ident.matches(':').count() > 1 {
        return Err(IndexError::InvalidArgument(format!(
            "Identifier '{ident}' has more than one ':'"
        )));
    }
    if let Some((ty, key)) = ident.split_once(':') {
        return maps
            .lookup_qualified(ty, key)
            .map(str::to_string)
            .ok_or_else(|| IndexError::NodeNotFound(ident.to_string()));
    }
    match maps.lookup_exact_key(ident) {
        KeyMatch::One(id) => return Ok(id),
        KeyMatch::Many(count) => {
            return Err(IndexError::AmbiguousIdentifier {
                ident: ident.to_string(),
                count,
            })
        }
        KeyMatch::None => {}
    }
    match maps.lookup_last_segment(ident) {
        KeyMatch::One(id) => Ok(id),
        KeyMatch::Many(count) => Err(IndexError::AmbiguousIdentifier {
            ident: ident.to_string(),
            count,
        }),
        KeyMatch::None => Err(IndexError::NodeNotFound(ident.to_string())),
    }
}

/// An edge-type whitelist; empty means "no filter".
pub(crate) fn edge_type_whitelist(edge_types: &[String]) -> Option<HashSet<&str>> {
    if edge_types.is_empty() {
        None
    } else {
        Some(edge_types.iter().map(String::as_str).collect())
    }
}

pub(crate) fn edge_type_allowed(whitelist: &Option<HashSet<&str>>, edge_type: &str) -> bool {
    match whitelist {
        None => true,
        Some(set) => set.contains(edge_type),
    }
}

/// Lexicographic `(type, key)` sort key for a node id; unknown ids sort
/// last (they should not occur in a consistent index).
pub(crate) fn type_key_of<'a>(
    graph: &'a crate::graph::Graph,
    id: &str,
) -> (&'a str, &'a str) {
    graph
        .node(id)
        .map(|n| (n.ty.as_str(), n.key.as_str()))
        .unwrap_or(("\u{10FFFF}", "\u{10FFFF}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maps() -> ResolutionMaps {
        let mut m = ResolutionMaps::new();
        m.insert("note", "alpha", "n1");
        m.insert("task", "alpha", "n2");
        m.insert("note", "projects/web/auth", "n3");
        m
    }

    #[test]
    fn test_qualified_identifier() {
        assert_eq!(resolve_identifier(&maps(), "note:alpha").unwrap(), "n1");
        let err = resolve_identifier(&maps(), "note:missing").unwrap_err();
        assert_eq!(err.code(), "NODE_NOT_FOUND");
    }

    #[test]
    fn test_unqualified_ambiguity() {
        let err = resolve_identifier(&maps(), "alpha").unwrap_err();
        assert_eq!(err.code(), "AMBIGUOUS_IDENTIFIER");
    }

    #[test]
    fn test_last_segment_fallback() {
        assert_eq!(resolve_identifier(&maps(), "auth").unwrap(), "n3");
    }

    #[test]
    fn test_double_colon_is_invalid() {
        let err = resolve_identifier(&maps(), "a:b:c").unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_filter_matching() {
        let node = Node {
            id: "n1".into(),
            ty: "note".into(),
            key: "alpha".into(),
            title: None,
            state: Some("open".into()),
            created: None,
            updated: None,
            path: "note/alpha.Rmd".into(),
            mtime_ns: 0,
            size_bytes: 0,
            hash: None,
        };
        let mut filter = NodeFilter::default();
        assert!(filter.matches(&node, &[]));
        filter.types = vec!["task".into()];
        assert!(!filter.matches(&node, &[]));
        filter.types = vec!["note".into()];
        filter.tags = vec!["a".into(), "b".into()];
        assert!(!filter.matches(&node, &["a".into()]));
        filter.tag_match = TagMatch::Any;
        assert!(filter.matches(&node, &["a".into()]));
    }
}
