//! Link resolution: raw targets to node identities.
//!
//! Lookup maps are rebuilt per pass (full rebuild) or per event
//! (incremental), never persisted. Ambiguity is always a diagnostic;
//! there are no tie-breaks.

use std::collections::HashMap;

use crate::model::{
    last_segment, Diagnostic, DiagnosticCode, Edge, RawLink, Severity,
};

/// Secondary lookup maps over indexed node identities.
#[derive(Debug, Clone, Default)]
pub struct ResolutionMaps {
    /// `(type, key)` → id.
    by_type_key: HashMap<(String, String), String>,
    /// Full key → ids across all types.
    by_key: HashMap<String, Vec<String>>,
    /// `last_segment(key)` → ids across all types.
    by_last_segment: HashMap<String, Vec<String>>,
}

/// Cardinality of an unqualified lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    None,
    One(String),
    Many(usize),
}

impl ResolutionMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one node identity in all three maps.
    pub fn insert(&mut self, ty: &str, key: &str, id: &str) {
        self.by_type_key
            .insert((ty.to_string(), key.to_string()), id.to_string());
        self.by_key
            .entry(key.to_string())
            .or_default()
            .push(id.to_string());
        self.by_last_segment
            .entry(last_segment(key).to_string())
            .or_default()
            .push(id.to_string());
    }

    pub fn lookup_qualified(&self, ty: &str, key: &str) -> Option<&str> {
        self.by_type_key
            .get(&(ty.to_string(), key.to_string()))
            .map(String::as_str)
    }

    /// Exact full-key match across all types.
    pub fn lookup_exact_key(&self, key: &str) -> KeyMatch {
        match self.by_key.get(key).map(Vec::as_slice) {
            None | Some([]) => KeyMatch::None,
            Some([id]) => KeyMatch::One(id.clone()),
            Some(ids) => KeyMatch::Many(ids.len()),
        }
    }

    /// Last-segment match across all types.
    pub fn lookup_last_segment(&self, key: &str) -> KeyMatch {
        match self.by_last_segment.get(key).map(Vec::as_slice) {
            None | Some([]) => KeyMatch::None,
            Some([id]) => KeyMatch::One(id.clone()),
            Some(ids) => KeyMatch::Many(ids.len()),
        }
    }
}

/// Resolve `links` from `from_id` against `maps`, producing the complete
/// outgoing edge set plus resolution diagnostics.
///
/// Unresolved and ambiguous links still produce edges (with `to_id` None);
/// they are first-class graph data.
pub fn resolve_links(
    from_id: &str,
    links: &[RawLink],
    maps: &ResolutionMaps,
) -> (Vec<Edge>, Vec<Diagnostic>) {
    let mut edges = Vec::with_capacity(links.len());
    let mut diagnostics = Vec::new();

    for link in links {
        let to_id = match &link.target.ty {
            Some(ty) => match maps.lookup_qualified(ty, &link.target.key) {
                Some(id) => Some(id.to_string()),
                None => {
                    diagnostics.push(Diagnostic::new(
                        Severity::Warn,
                        DiagnosticCode::UnresolvedLink,
                        format!("Link target '{}:{}' not found", ty, link.target.key),
                        Some(link.span.clone()),
                    ));
                    None
                }
            },
            None => resolve_unqualified(&link.target.key, &link.span, maps, &mut diagnostics),
        };

        edges.push(Edge {
            from_id: from_id.to_string(),
            to_id,
            edge_type: link.edge_type.clone(),
            raw_target: link.target.clone(),
            span: link.span.clone(),
        });
    }

    (edges, diagnostics)
}

/// Exact full-key match wins outright; the last-segment map is only
/// consulted when there is no exact match at all.
fn resolve_unqualified(
    key: &str,
    span: &crate::model::Span,
    maps: &ResolutionMaps,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    match maps.lookup_exact_key(key) {
        KeyMatch::One(id) => return Some(id),
        KeyMatch::Many(count) => {
            diagnostics.push(ambiguous(key, count, span));
            return None;
        }
        KeyMatch::None => {}
    }
    match maps.lookup_last_segment(key) {
        KeyMatch::One(id) => Some(id),
        KeyMatch::Many(count) => {
            diagnostics.push(ambiguous(key, count, span));
            None
        }
        KeyMatch::None => {
            diagnostics.push(Diagnostic::new(
                Severity::Warn,
                DiagnosticCode::UnresolvedLink,
                format!("Link target '{key}' not found"),
                Some(span.clone()),
            ));
            None
        }
    }
}

fn ambiguous(key: &str, count: usize, span: &crate::model::Span) -> Diagnostic {
    Diagnostic::new(
        Severity::Error,
        DiagnosticCode::AmbiguousLink,
        format!("Link target '{key}' is ambiguous ({count} matches)"),
        Some(span.clone()),
    )
}
