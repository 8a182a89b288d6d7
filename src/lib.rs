//! notegraph: typed note vault indexer and embedded graph query engine.
//!
//! A vault is a directory tree of typed markdown-like notes. Each note
//! declares a stable identity (`id`, `type`, `key`) in YAML frontmatter and
//! links to other notes with `[[…]]` wiki-links in its body. notegraph
//! turns the vault into a queryable graph held in an embedded SQLite index:
//!
//! - [`builder::rebuild`] performs a full two-pass rebuild into a temporary
//!   database, atomically renamed over the live index on success.
//! - [`watcher::VaultWatcher`] emits debounced per-path filesystem events;
//!   [`indexer::apply_event`] applies one event as one transaction.
//! - [`query`] answers Search, Backlinks, Neighbors, and Paths over a
//!   [`graph::Graph`] materialized from the index; [`export`] produces a
//!   deterministic JSON dump.
//!
//! All ordering contracts (adjacency order, result order, export bytes)
//! are stable so that identical inputs produce identical outputs.

pub mod builder;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod indexer;
pub mod model;
pub mod parser;
pub mod query;
pub mod resolver;
pub mod stats;
pub mod store;
pub mod watcher;

pub use builder::{rebuild, BuildStats};
pub use cancel::CancelFlag;
pub use config::VaultConfig;
pub use error::{IndexError, Result};
pub use graph::Graph;
pub use indexer::{apply_event, IndexOutcome};
pub use model::{Diagnostic, Edge, Node, RawLink, RawTarget, Severity, Span};
pub use store::{DiagnosticRow, Store};
pub use watcher::{NoteEvent, Op, VaultWatcher};
