//! Note file parsing: frontmatter, body, raw links, diagnostics.
//!
//! Parsing never fails the pipeline. Invalid input produces a partial
//! [`ParsedNote`] carrying diagnostics; a note without a complete identity
//! (`id`, `type`, `key`) is simply not indexable.

pub mod links;

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::model::{Diagnostic, DiagnosticCode, RawLink, Severity, Span};

pub use links::extract_links;

/// Parsed frontmatter fields. Unknown keys are preserved in `extra` and
/// passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub id: Option<String>,
    pub ty: Option<String>,
    pub key: Option<String>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub tags: Vec<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

/// Result of parsing one note file.
#[derive(Debug, Clone)]
pub struct ParsedNote {
    /// Path as recorded in spans and the index.
    pub path: String,
    pub frontmatter: Frontmatter,
    pub body: String,
    /// Byte offset of the body within the source file.
    pub body_offset: usize,
    pub links: Vec<RawLink>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedNote {
    /// The `(id, type, key)` identity, if all three are present and
    /// non-empty. Notes without a complete identity are not indexed.
    pub fn identity(&self) -> Option<(&str, &str, &str)> {
        match (
            self.frontmatter.id.as_deref(),
            self.frontmatter.ty.as_deref(),
            self.frontmatter.key.as_deref(),
        ) {
            (Some(id), Some(ty), Some(key)) if !id.is_empty() && !ty.is_empty() && !key.is_empty() => {
                Some((id, ty, key))
            }
            _ => None,
        }
    }
}

/// Parse a note file into frontmatter, body, links, and diagnostics.
pub fn parse_note(path: &str, bytes: &[u8]) -> ParsedNote {
    let text = String::from_utf8_lossy(bytes);
    let mut diagnostics = Vec::new();

    let (frontmatter, body, body_offset) = match split_frontmatter(&text) {
        Some((fm_text, fm_span, body, body_offset)) => {
            let fm = parse_frontmatter(path, fm_text, fm_span, &mut diagnostics);
            (fm, body, body_offset)
        }
        None => {
            diagnostics.push(Diagnostic::new(
                Severity::Warn,
                DiagnosticCode::FrontmatterMissing,
                "Missing frontmatter delimiters; file is not indexable",
                None,
            ));
            (Frontmatter::default(), text.as_ref(), 0)
        }
    };

    let links = extract_links(path, body, body_offset);

    ParsedNote {
        path: path.to_string(),
        frontmatter,
        body: body.to_string(),
        body_offset,
        links,
        diagnostics,
    }
}

/// Split `text` into the frontmatter region and the body.
///
/// The first three bytes must be `---`; the closing delimiter is a later
/// line whose content is exactly `---`. Returns the frontmatter text, its
/// `(start, end)` byte range, the body slice, and the body's byte offset.
/// The newline terminating the closing delimiter line is consumed; any
/// later `---` lines belong to the body.
fn split_frontmatter(text: &str) -> Option<(&str, (usize, usize), &str, usize)> {
    if !text.starts_with("---") {
        return None;
    }

    // Opening delimiter consumes through the first newline.
    let fm_start = match text.find('\n') {
        Some(idx) => idx + 1,
        None => return None,
    };

    let mut offset = fm_start;
    for line in text[fm_start..].split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        let content = content.strip_suffix('\r').unwrap_or(content);
        if content == "---" {
            let body_offset = offset + line.len();
            return Some((
                &text[fm_start..offset],
                (fm_start, offset),
                &text[body_offset..],
                body_offset,
            ));
        }
        offset += line.len();
    }
    None
}

/// Parse the delimited frontmatter region as YAML.
///
/// A syntax error yields an empty frontmatter plus a
/// `FRONTMATTER_PARSE_ERROR` diagnostic. A recognized key holding an
/// unusable value (e.g. a mapping where a scalar is expected) also emits
/// `FRONTMATTER_PARSE_ERROR` but keeps the remaining fields.
fn parse_frontmatter(
    path: &str,
    fm_text: &str,
    fm_span: (usize, usize),
    diagnostics: &mut Vec<Diagnostic>,
) -> Frontmatter {
    let span = Some(Span::new(path, fm_span.0 as u64, fm_span.1 as u64));

    let value: Value = match serde_yaml::from_str(fm_text) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                DiagnosticCode::FrontmatterParseError,
                format!("Frontmatter is not valid YAML: {e}"),
                span,
            ));
            return Frontmatter::default();
        }
    };

    let mapping = match value {
        Value::Mapping(m) => m,
        Value::Null => return Frontmatter::default(),
        other => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                DiagnosticCode::FrontmatterParseError,
                format!("Frontmatter must be a mapping, got {}", value_kind(&other)),
                span,
            ));
            return Frontmatter::default();
        }
    };

    let mut fm = Frontmatter::default();
    for (k, v) in mapping {
        let key = match k.as_str() {
            Some(s) => s.to_string(),
            None => {
                // Non-string keys pass through as extra, stringified.
                fm.extra.insert(format!("{k:?}"), v);
                continue;
            }
        };
        let slot = match key.as_str() {
            "id" => Some(&mut fm.id),
            "type" => Some(&mut fm.ty),
            "key" => Some(&mut fm.key),
            "title" => Some(&mut fm.title),
            "state" => Some(&mut fm.state),
            "created" => Some(&mut fm.created),
            "updated" => Some(&mut fm.updated),
            _ => None,
        };
        match slot {
            Some(slot) => match scalar_string(&v) {
                Ok(s) => *slot = s,
                Err(kind) => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::FrontmatterParseError,
                    format!("Frontmatter key '{key}' expects a scalar, got {kind}"),
                    span.clone(),
                )),
            },
            None if key == "tags" => match &v {
                Value::Sequence(items) => {
                    for item in items {
                        match scalar_string(item) {
                            Ok(Some(tag)) if !tag.is_empty() => fm.tags.push(tag),
                            Ok(_) => {}
                            Err(kind) => diagnostics.push(Diagnostic::new(
                                Severity::Error,
                                DiagnosticCode::FrontmatterParseError,
                                format!("Frontmatter tag entries must be scalars, got {kind}"),
                                span.clone(),
                            )),
                        }
                    }
                }
                Value::Null => {}
                other => diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::FrontmatterParseError,
                    format!("Frontmatter key 'tags' expects a sequence, got {}", value_kind(other)),
                    span.clone(),
                )),
            },
            None => {
                fm.extra.insert(key, v);
            }
        }
    }
    fm
}

/// Render a YAML scalar as its string form. `Ok(None)` for null.
fn scalar_string(v: &Value) -> std::result::Result<Option<String>, &'static str> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Sequence(_) => Err("a sequence"),
        Value::Mapping(_) => Err("a mapping"),
        Value::Tagged(_) => Err("a tagged value"),
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "---\nid: n1\ntype: note\nkey: alpha\ntitle: Alpha\ntags:\n  - one\n  - two\nstate: open\ncreated: 2024-01-02T03:04:05Z\ncustom: kept\n---\nBody with [[beta]].\n";

    #[test]
    fn test_full_note_parses() {
        let parsed = parse_note("note/alpha.Rmd", NOTE.as_bytes());
        assert!(parsed.diagnostics.is_empty());
        assert_eq!(parsed.identity(), Some(("n1", "note", "alpha")));
        assert_eq!(parsed.frontmatter.title.as_deref(), Some("Alpha"));
        assert_eq!(parsed.frontmatter.tags, vec!["one", "two"]);
        assert_eq!(
            parsed.frontmatter.created.as_deref(),
            Some("2024-01-02T03:04:05Z")
        );
        assert!(parsed.frontmatter.extra.contains_key("custom"));
        assert_eq!(parsed.body, "Body with [[beta]].\n");
        assert_eq!(parsed.links.len(), 1);
    }

    #[test]
    fn test_link_spans_are_absolute() {
        let parsed = parse_note("note/alpha.Rmd", NOTE.as_bytes());
        let span = &parsed.links[0].span;
        let text = NOTE.as_bytes();
        assert_eq!(
            &text[span.start as usize..span.end as usize],
            "[[beta]]".as_bytes()
        );
    }

    #[test]
    fn test_missing_opening_delimiter() {
        let parsed = parse_note("note/a.Rmd", b"no frontmatter here");
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].code, "FRONTMATTER_MISSING");
        assert_eq!(parsed.identity(), None);
        assert_eq!(parsed.body, "no frontmatter here");
    }

    #[test]
    fn test_missing_closing_delimiter() {
        let parsed = parse_note("note/a.Rmd", b"---\nid: n1\nno closing");
        assert_eq!(parsed.diagnostics[0].code, "FRONTMATTER_MISSING");
        assert_eq!(parsed.identity(), None);
        assert_eq!(parsed.body, "---\nid: n1\nno closing");
    }

    #[test]
    fn test_later_dashes_belong_to_body() {
        let parsed = parse_note("n.Rmd", b"---\nid: a\ntype: note\nkey: k\n---\nfirst\n---\nsecond\n");
        assert_eq!(parsed.body, "first\n---\nsecond\n");
    }

    #[test]
    fn test_yaml_syntax_error_still_extracts_body() {
        let parsed = parse_note("n.Rmd", b"---\nid: [unclosed\n---\nthe body\n");
        assert_eq!(parsed.diagnostics[0].code, "FRONTMATTER_PARSE_ERROR");
        assert_eq!(parsed.identity(), None);
        assert_eq!(parsed.body, "the body\n");
    }

    #[test]
    fn test_scalar_coercion_for_recognized_keys() {
        let parsed = parse_note("n.Rmd", b"---\nid: 42\ntype: note\nkey: k\n---\n");
        assert_eq!(parsed.identity(), Some(("42", "note", "k")));
    }

    #[test]
    fn test_non_scalar_recognized_key_keeps_rest() {
        let parsed = parse_note("n.Rmd", b"---\nid: n1\ntype: note\nkey: k\ntitle: {a: b}\n---\n");
        assert_eq!(parsed.identity(), Some(("n1", "note", "k")));
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].code, "FRONTMATTER_PARSE_ERROR");
        assert_eq!(parsed.frontmatter.title, None);
    }

    #[test]
    fn test_crlf_delimiters() {
        let parsed = parse_note("n.Rmd", b"---\r\nid: n1\r\ntype: note\r\nkey: k\r\n---\r\nbody");
        assert_eq!(parsed.identity(), Some(("n1", "note", "k")));
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn test_empty_identity_fields_are_not_indexable() {
        let parsed = parse_note("n.Rmd", b"---\nid: ''\ntype: note\nkey: k\n---\n");
        assert_eq!(parsed.identity(), None);
    }
}
