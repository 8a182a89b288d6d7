//! notegraph CLI: rebuild, watch, query, and export a note vault index.
//!
//! Query subcommands print a JSON envelope with `schema_version`, the
//! echoed query, and the results. Errors exit non-zero with a stable code
//! on stderr; results and errors are never mixed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use notegraph::query::{
    backlinks, neighbors, paths, search, BacklinksQuery, Direction, NeighborsQuery, NodeFilter,
    PathsQuery, Response, SearchQuery, TagMatch, DEFAULT_MAX_PATHS,
};
use notegraph::{
    apply_event, export, query, rebuild, stats, CancelFlag, Graph, IndexError, Severity, Store,
    VaultConfig, VaultWatcher,
};

#[derive(Parser)]
#[command(name = "notegraph", version, about = "Typed note vault indexer and graph query engine")]
struct Cli {
    /// Vault root directory
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the whole index from the vault
    Rebuild,
    /// Watch the vault and apply incremental updates until interrupted
    Watch,
    /// Search nodes by type, state, and tags
    Search {
        #[arg(long = "type")]
        types: Vec<String>,
        #[arg(long = "state")]
        states: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Match any of the given tags instead of all of them
        #[arg(long)]
        any_tag: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// One-hop links touching a note
    Backlinks {
        ident: String,
        #[arg(long, default_value = "in")]
        direction: String,
        #[arg(long = "edge-type")]
        edge_types: Vec<String>,
    },
    /// BFS neighbors up to a depth
    Neighbors {
        ident: String,
        #[arg(long)]
        max_depth: u32,
        #[arg(long, default_value = "out")]
        direction: String,
        #[arg(long = "edge-type")]
        edge_types: Vec<String>,
        #[arg(long = "type")]
        types: Vec<String>,
        #[arg(long = "state")]
        states: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        any_tag: bool,
    },
    /// BFS shortest paths from a source to each destination
    Paths {
        source: String,
        #[arg(required = true)]
        destinations: Vec<String>,
        #[arg(long)]
        max_depth: u32,
        #[arg(long, default_value_t = DEFAULT_MAX_PATHS)]
        max_paths: u32,
    },
    /// Deterministic JSON export of the index
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Node and edge counts by type
    Stats,
    /// List diagnostics, optionally for one note and/or a minimum level
    Diagnostics {
        ident: Option<String>,
        #[arg(long)]
        level: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("NOTEGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        match err.downcast_ref::<IndexError>() {
            Some(ie) => eprintln!("error[{}]: {ie}", ie.code()),
            None => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = VaultConfig::load(&cli.vault)?;

    match cli.command {
        Command::Rebuild => {
            let stats = rebuild(&cfg, &CancelFlag::new())?;
            println!(
                "indexed {} notes ({} skipped, {} without identity)",
                stats.indexed, stats.skipped, stats.unindexable
            );
        }
        Command::Watch => watch(&cfg)?,
        Command::Search {
            types,
            states,
            tags,
            any_tag,
            limit,
            offset,
        } => {
            let store = Store::open(cfg.index_path())?;
            let q = SearchQuery {
                filter: node_filter(types, states, tags, any_tag),
                limit,
                offset,
            };
            let results = search(&store, &q)?;
            print_json(&Response::new(q, results))?;
        }
        Command::Backlinks {
            ident,
            direction,
            edge_types,
        } => {
            let store = Store::open(cfg.index_path())?;
            let graph = Graph::load(&store)?;
            let q = BacklinksQuery {
                ident,
                direction: Direction::parse(&direction)?,
                edge_types,
            };
            let results = backlinks(&graph, &q)?;
            print_json(&Response::new(q, results))?;
        }
        Command::Neighbors {
            ident,
            max_depth,
            direction,
            edge_types,
            types,
            states,
            tags,
            any_tag,
        } => {
            let store = Store::open(cfg.index_path())?;
            let graph = Graph::load(&store)?;
            let q = NeighborsQuery {
                ident,
                max_depth,
                direction: Direction::parse(&direction)?,
                edge_types,
                filter: node_filter(types, states, tags, any_tag),
            };
            let results = neighbors(&graph, &q, &CancelFlag::new())?;
            print_json(&Response::new(q, results))?;
        }
        Command::Paths {
            source,
            destinations,
            max_depth,
            max_paths,
        } => {
            let store = Store::open(cfg.index_path())?;
            let graph = Graph::load(&store)?;
            let q = PathsQuery {
                source,
                destinations,
                max_depth,
                max_paths,
            };
            let results = paths(&graph, &q, &CancelFlag::new())?;
            print_json(&Response::new(q, results))?;
        }
        Command::Export { output } => {
            let store = Store::open(cfg.index_path())?;
            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    export::write_export(&store, file)?;
                }
                None => export::write_export(&store, std::io::stdout().lock())?,
            }
        }
        Command::Stats => {
            let store = Store::open(cfg.index_path())?;
            print_json(&stats::collect(&store)?)?;
        }
        Command::Diagnostics { ident, level } => {
            let store = Store::open(cfg.index_path())?;
            let node_id = match &ident {
                Some(ident) => {
                    let maps = store.load_resolution_maps()?;
                    Some(query::resolve_identifier(&maps, ident)?)
                }
                None => None,
            };
            let min_level = match level.as_deref() {
                Some(s) => Some(Severity::parse(s).ok_or_else(|| {
                    IndexError::InvalidArgument(format!(
                        "Level must be 'info', 'warn', or 'error', got '{s}'"
                    ))
                })?),
                None => None,
            };
            let rows = store.diagnostics(node_id.as_deref(), min_level)?;
            print_json(&rows)?;
        }
    }
    Ok(())
}

/// Consume watcher events serially until SIGINT/SIGTERM.
fn watch(cfg: &VaultConfig) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    let mut watcher = VaultWatcher::start(cfg)?;
    while !shutdown.load(Ordering::SeqCst) {
        match watcher.events().recv_timeout(Duration::from_millis(200)) {
            Ok(event) => {
                if let Err(e) = apply_event(cfg, &event) {
                    warn!(path = %event.path.display(), "Event failed: {e}");
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
        while let Ok(e) = watcher.errors().try_recv() {
            warn!("Watcher error: {e}");
        }
    }
    watcher.stop();
    Ok(())
}

fn node_filter(
    types: Vec<String>,
    states: Vec<String>,
    tags: Vec<String>,
    any_tag: bool,
) -> NodeFilter {
    NodeFilter {
        types,
        states,
        tags,
        tag_match: if any_tag { TagMatch::Any } else { TagMatch::All },
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
