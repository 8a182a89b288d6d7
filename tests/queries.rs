//! Integration tests: queries over a built index.

use std::fs;

use notegraph::query::{
    backlinks, neighbors, paths, search, BacklinksQuery, Direction, NeighborsQuery, NodeFilter,
    PathsQuery, SearchQuery, TagMatch,
};
use notegraph::{rebuild, CancelFlag, Graph, Store, VaultConfig};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn vault() -> (TempDir, VaultConfig) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut cfg = VaultConfig::new(root);
    cfg.types = vec!["note".to_string(), "task".to_string()];
    (dir, cfg)
}

fn write_note(cfg: &VaultConfig, rel: &str, frontmatter: &str, body: &str) {
    let path = cfg.root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("---\n{frontmatter}---\n{body}")).unwrap();
}

fn simple(id: &str, ty: &str, key: &str) -> String {
    format!("id: {id}\ntype: {ty}\nkey: {key}\n")
}

/// Build a small web:
///   a -> b (related-to), a -> c (blocks), b -> c, c -> a (cycle),
///   b -> ghost (unresolved)
fn linked_vault() -> (TempDir, VaultConfig, Store, Graph) {
    let (dir, cfg) = vault();
    write_note(&cfg, "note/a.Rmd", &simple("a", "note", "a"), "[[b]] [[c|blocks]]\n");
    write_note(&cfg, "note/b.Rmd", &simple("b", "note", "b"), "[[c]] [[ghost]]\n");
    write_note(&cfg, "note/c.Rmd", &simple("c", "note", "c"), "[[a]]\n");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();
    (dir, cfg, store, graph)
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn search_orders_and_paginates() {
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/b.Rmd", &simple("nb", "note", "b"), "");
    write_note(&cfg, "note/a.Rmd", &simple("na", "note", "a"), "");
    write_note(&cfg, "task/a.Rmd", &simple("ta", "task", "a"), "");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();

    let all = search(&store, &SearchQuery::default()).unwrap();
    let keys: Vec<(String, String)> = all.iter().map(|n| (n.ty.clone(), n.key.clone())).collect();
    assert_eq!(
        keys,
        vec![
            ("note".into(), "a".into()),
            ("note".into(), "b".into()),
            ("task".into(), "a".into()),
        ]
    );

    let page = search(
        &store,
        &SearchQuery {
            limit: Some(2),
            offset: 2,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "ta");
}

#[test]
fn search_filters_by_tags() {
    let (_dir, cfg) = vault();
    write_note(
        &cfg,
        "note/a.Rmd",
        "id: na\ntype: note\nkey: a\ntags:\n  - web\n  - auth\n",
        "",
    );
    write_note(
        &cfg,
        "note/b.Rmd",
        "id: nb\ntype: note\nkey: b\ntags:\n  - web\n",
        "",
    );
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();

    let all_match = search(
        &store,
        &SearchQuery {
            filter: NodeFilter {
                tags: vec!["web".into(), "auth".into()],
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(all_match.len(), 1);
    assert_eq!(all_match[0].id, "na");

    let any_match = search(
        &store,
        &SearchQuery {
            filter: NodeFilter {
                tags: vec!["web".into(), "auth".into()],
                tag_match: TagMatch::Any,
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(any_match.len(), 2);
}

// ---------------------------------------------------------------------------
// Backlinks
// ---------------------------------------------------------------------------

#[test]
fn backlinks_one_hop_in() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let results = backlinks(&graph, &BacklinksQuery::new("c")).unwrap();
    let sources: Vec<&str> = results.iter().map(|b| b.source.id.as_str()).collect();
    assert_eq!(sources, vec!["a", "b"]);
    assert!(results.iter().all(|b| b.target.id == "c"));
}

#[test]
fn backlinks_out_skips_unresolved() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let mut query = BacklinksQuery::new("b");
    query.direction = Direction::Out;
    let results = backlinks(&graph, &query).unwrap();
    // b links to c and to ghost; only the resolved edge surfaces.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].target.id, "c");
}

#[test]
fn backlinks_edge_type_whitelist() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let mut query = BacklinksQuery::new("c");
    query.edge_types = vec!["blocks".to_string()];
    let results = backlinks(&graph, &query).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source.id, "a");
    assert_eq!(results[0].edge_type, "blocks");
}

#[test]
fn backlinks_both_deduplicates_pairs() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let mut query = BacklinksQuery::new("a");
    query.direction = Direction::Both;
    let results = backlinks(&graph, &query).unwrap();
    // Touching edges: c->a (in), a->b, a->c (out). Three distinct pairs.
    assert_eq!(results.len(), 3);
}

// ---------------------------------------------------------------------------
// Neighbors
// ---------------------------------------------------------------------------

#[test]
fn neighbors_layers_by_depth() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let layers = neighbors(&graph, &NeighborsQuery::new("a", 2), &CancelFlag::new()).unwrap();
    // c was reached at depth 1; depth 2 only revisits, so no third layer.
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].depth, 0);
    assert_eq!(ids(&layers[0]), vec!["a"]);
    assert_eq!(ids(&layers[1]), vec!["b", "c"]);
}

fn ids(layer: &notegraph::query::DepthLayer) -> Vec<&str> {
    layer.nodes.iter().map(|n| n.id.as_str()).collect()
}

#[test]
fn neighbors_zero_depth_is_invalid() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let err = neighbors(&graph, &NeighborsQuery::new("a", 0), &CancelFlag::new()).unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[test]
fn neighbors_cycle_terminates() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let layers = neighbors(&graph, &NeighborsQuery::new("a", 50), &CancelFlag::new()).unwrap();
    let total: usize = layers.iter().map(|l| l.nodes.len()).sum();
    assert!(total <= 3);
}

#[test]
fn neighbors_direction_in() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let mut query = NeighborsQuery::new("c", 1);
    query.direction = Direction::In;
    let layers = neighbors(&graph, &query, &CancelFlag::new()).unwrap();
    assert_eq!(ids(&layers[1]), vec!["a", "b"]);
}

#[test]
fn neighbors_post_filter_drops_nodes_not_traversal() {
    let (_dir, cfg) = vault();
    write_note(
        &cfg,
        "note/hub.Rmd",
        "id: hub\ntype: note\nkey: hub\ntags:\n  - keep\n",
        "[[mid]]\n",
    );
    write_note(&cfg, "note/mid.Rmd", &simple("mid", "note", "mid"), "[[leaf]]\n");
    write_note(
        &cfg,
        "note/leaf.Rmd",
        "id: leaf\ntype: note\nkey: leaf\ntags:\n  - keep\n",
        "",
    );
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let mut query = NeighborsQuery::new("hub", 2);
    query.filter = NodeFilter {
        tags: vec!["keep".into()],
        ..Default::default()
    };
    let layers = neighbors(&graph, &query, &CancelFlag::new()).unwrap();
    // mid fails the filter but is still traversed through; its layer is
    // omitted from the output.
    let depths: Vec<u32> = layers.iter().map(|l| l.depth).collect();
    assert_eq!(depths, vec![0, 2]);
    assert_eq!(ids(&layers[1]), vec!["leaf"]);
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[test]
fn paths_with_cycle_finds_single_shortest() {
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/a.Rmd", &simple("a", "note", "a"), "[[b]]\n");
    write_note(&cfg, "note/b.Rmd", &simple("b", "note", "b"), "[[a]]\n");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let results = paths(&graph, &PathsQuery::new("a", vec!["b".to_string()], 5), &CancelFlag::new()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].hop_count, 1);
    let node_ids: Vec<&str> = results[0].nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["a", "b"]);
}

#[test]
fn paths_source_equals_destination() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let results = paths(&graph, &PathsQuery::new("a", vec!["a".to_string()], 3), &CancelFlag::new()).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].hop_count, 0);
    assert!(results[0].edges.is_empty());
    assert_eq!(results[0].nodes.len(), 1);
}

#[test]
fn paths_depth_bound_excludes_longer_routes() {
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/a.Rmd", &simple("a", "note", "a"), "[[b]]\n");
    write_note(&cfg, "note/b.Rmd", &simple("b", "note", "b"), "[[c]]\n");
    write_note(&cfg, "note/c.Rmd", &simple("c", "note", "c"), "");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let found = paths(&graph, &PathsQuery::new("a", vec!["c".to_string()], 2), &CancelFlag::new()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].hop_count, 2);

    let too_shallow = paths(&graph, &PathsQuery::new("a", vec!["c".to_string()], 1), &CancelFlag::new()).unwrap();
    assert!(too_shallow.is_empty());
}

#[test]
fn paths_max_paths_zero_means_none() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let mut query = PathsQuery::new("a", vec!["b".to_string()], 3);
    query.max_paths = 0;
    assert!(paths(&graph, &query, &CancelFlag::new()).unwrap().is_empty());
}

#[test]
fn paths_never_traverse_unresolved_edges() {
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/a.Rmd", &simple("a", "note", "a"), "[[ghost]]\n");
    write_note(&cfg, "note/b.Rmd", &simple("b", "note", "b"), "");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let results = paths(&graph, &PathsQuery::new("a", vec!["b".to_string()], 5), &CancelFlag::new()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn paths_emits_all_equal_length_shortest() {
    // Two parallel two-hop routes a -> m1 -> z and a -> m2 -> z.
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/a.Rmd", &simple("a", "note", "a"), "[[m1]] [[m2]]\n");
    write_note(&cfg, "note/m1.Rmd", &simple("m1", "note", "m1"), "[[z]]\n");
    write_note(&cfg, "note/m2.Rmd", &simple("m2", "note", "m2"), "[[z]]\n");
    write_note(&cfg, "note/z.Rmd", &simple("z", "note", "z"), "");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let results = paths(&graph, &PathsQuery::new("a", vec!["z".to_string()], 5), &CancelFlag::new()).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|p| p.hop_count == 2));
    // Ordered by node-id sequence within the destination group.
    let first: Vec<&str> = results[0].nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(first, vec!["a", "m1", "z"]);
}

// ---------------------------------------------------------------------------
// Failure semantics
// ---------------------------------------------------------------------------

#[test]
fn missing_endpoint_is_node_not_found() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let err = backlinks(&graph, &BacklinksQuery::new("nope")).unwrap_err();
    assert_eq!(err.code(), "NODE_NOT_FOUND");
    let err = neighbors(&graph, &NeighborsQuery::new("note:nope", 2), &CancelFlag::new()).unwrap_err();
    assert_eq!(err.code(), "NODE_NOT_FOUND");
    let err = paths(&graph, &PathsQuery::new("a", vec!["nope".to_string()], 2), &CancelFlag::new()).unwrap_err();
    assert_eq!(err.code(), "NODE_NOT_FOUND");
}

#[test]
fn ambiguous_identifier_is_reported() {
    let (_dir, cfg) = vault();
    write_note(&cfg, "note/x.Rmd", &simple("nx", "note", "shared"), "");
    write_note(&cfg, "task/x.Rmd", &simple("tx", "task", "shared"), "");
    rebuild(&cfg, &CancelFlag::new()).unwrap();
    let store = Store::open(cfg.index_path()).unwrap();
    let graph = Graph::load(&store).unwrap();

    let err = backlinks(&graph, &BacklinksQuery::new("shared")).unwrap_err();
    assert_eq!(err.code(), "AMBIGUOUS_IDENTIFIER");
}

#[test]
fn malformed_identifier_is_invalid_argument() {
    let (_dir, _cfg, _store, graph) = linked_vault();
    let err = backlinks(&graph, &BacklinksQuery::new("a:b:c")).unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}
