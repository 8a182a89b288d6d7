//! Wiki-link extraction from note bodies.
//!
//! Scans for `[[…]]` occurrences. Inner syntax:
//!   `[[key]]`, `[[type:key]]`, `[[key|edge-type]]`, `[[type:key|edge-type]]`
//! Whitespace inside the brackets is trimmed. Links with empty components
//! are skipped silently; unterminated `[[…` never matches.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::model::{RawLink, RawTarget, Span, DEFAULT_EDGE_TYPE};

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]]*)\]\]").expect("link regex is valid"))
}

/// Extract raw links from `body`. Spans are absolute byte offsets within
/// the source file (`body_offset` + match offsets), covering the outer
/// `[[…]]`.
pub fn extract_links(path: &str, body: &str, body_offset: usize) -> Vec<RawLink> {
    let mut links = Vec::new();
    for caps in link_re().captures_iter(body) {
        let whole = caps.get(0).expect("group 0 always present");
        let inner = caps.get(1).expect("group 1 always present").as_str();

        let (target_str, edge_type) = match inner.split_once('|') {
            Some((t, e)) => {
                let e = e.trim();
                let edge = if e.is_empty() { DEFAULT_EDGE_TYPE } else { e };
                (t, edge)
            }
            None => (inner, DEFAULT_EDGE_TYPE),
        };

        let target = match target_str.split_once(':') {
            Some((ty, key)) => {
                let ty = ty.trim();
                let key = key.trim();
                if ty.is_empty() || key.is_empty() {
                    continue;
                }
                RawTarget::qualified(ty, key)
            }
            None => {
                let key = target_str.trim();
                if key.is_empty() {
                    continue;
                }
                RawTarget::unqualified(key)
            }
        };

        links.push(RawLink {
            target,
            edge_type: edge_type.to_string(),
            span: Span::new(
                path,
                (body_offset + whole.start()) as u64,
                (body_offset + whole.end()) as u64,
            ),
        });
    }
    links
}
