//! Core domain types shared across the index pipeline.
//!
//! Nodes and edges are plain serde records. `RawTarget` and `Span` have a
//! canonical JSON form that the store persists verbatim; ordering contracts
//! (graph loader, export) compare that serialized form.

use serde::{Deserialize, Serialize};

/// Edge type used when a link carries no `|edge-type` suffix.
pub const DEFAULT_EDGE_TYPE: &str = "related-to";

/// Byte range within a specific source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub path: String,
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(path: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            path: path.into(),
            start,
            end,
        }
    }

    /// Canonical serialized form, as persisted in the store.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("span serialization is infallible")
    }
}

/// The target of a wiki-link as written in the source note.
///
/// `ty` is `Some` for qualified links (`[[type:key]]`) and `None` for
/// unqualified ones (`[[key]]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawTarget {
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub key: String,
}

impl RawTarget {
    pub fn qualified(ty: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            ty: Some(ty.into()),
            key: key.into(),
        }
    }

    pub fn unqualified(key: impl Into<String>) -> Self {
        Self {
            ty: None,
            key: key.into(),
        }
    }

    /// Canonical serialized form, as persisted in the store.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("raw target serialization is infallible")
    }
}

/// A wiki-link extracted from a note body, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub target: RawTarget,
    pub edge_type: String,
    pub span: Span,
}

/// An indexed note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub key: String,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub path: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
    pub hash: Option<String>,
}

impl Node {
    /// Human-addressable `(type, key)` identity.
    pub fn type_key(&self) -> (String, String) {
        (self.ty.clone(), self.key.clone())
    }
}

/// A directed, typed association between two nodes.
///
/// `to_id` is `None` iff the link did not resolve. Unresolved edges are
/// first-class: they persist and surface in exports, but outgoing traversal
/// never follows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from_id: String,
    pub to_id: Option<String>,
    pub edge_type: String,
    pub raw_target: RawTarget,
    pub span: Span,
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

/// Stable diagnostic codes emitted by parsing and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    FrontmatterMissing,
    FrontmatterParseError,
    UnresolvedLink,
    AmbiguousLink,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::FrontmatterMissing => "FRONTMATTER_MISSING",
            DiagnosticCode::FrontmatterParseError => "FRONTMATTER_PARSE_ERROR",
            DiagnosticCode::UnresolvedLink => "UNRESOLVED_LINK",
            DiagnosticCode::AmbiguousLink => "AMBIGUOUS_LINK",
        }
    }
}

/// A structured warning or error attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            severity,
            code: code.as_str().to_string(),
            message: message.into(),
            span,
        }
    }
}

/// Substring of a key after the final `/`, or the whole key if no `/`.
pub fn last_segment(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("alpha"), "alpha");
        assert_eq!(last_segment("projects/web/auth"), "auth");
        assert_eq!(last_segment("trailing/"), "");
    }

    #[test]
    fn test_raw_target_canonical_is_stable() {
        let q = RawTarget::qualified("note", "projects/web");
        assert_eq!(q.canonical(), r#"{"type":"note","key":"projects/web"}"#);
        let u = RawTarget::unqualified("alpha");
        assert_eq!(u.canonical(), r#"{"type":null,"key":"alpha"}"#);
    }

    #[test]
    fn test_span_canonical_is_stable() {
        let s = Span::new("note/a.Rmd", 10, 24);
        assert_eq!(s.canonical(), r#"{"path":"note/a.Rmd","start":10,"end":24}"#);
    }
}
