//! Filtered node search.
//!
//! Runs directly against the store: filters compile to SQL, ordering is
//! `(type, key)` under the BINARY collation, the same order the export
//! uses.

use serde::Serialize;

use crate::error::Result;
use crate::query::{NodeFilter, NodeInfo, TagMatch};
use crate::store::Store;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchQuery {
    #[serde(flatten)]
    pub filter: NodeFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Search nodes by type set, state set, and tag set, with pagination.
pub fn search(store: &Store, query: &SearchQuery) -> Result<Vec<NodeInfo>> {
    let mut sql = String::from(
        "SELECT id, type, key, title, state, created, updated, path, mtime_ns, size_bytes, hash \
         FROM nodes",
    );
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    let filter = &query.filter;
    if !filter.types.is_empty() {
        clauses.push(format!("type IN ({})", placeholders(&mut params, &filter.types)));
    }
    if !filter.states.is_empty() {
        clauses.push(format!("state IN ({})", placeholders(&mut params, &filter.states)));
    }
    if !filter.tags.is_empty() {
        match filter.tag_match {
            TagMatch::All => {
                for tag in &filter.tags {
                    params.push(Box::new(tag.clone()));
                    clauses.push(format!(
                        "EXISTS (SELECT 1 FROM tags WHERE tags.node_id = nodes.id AND tags.tag = ?{})",
                        params.len()
                    ));
                }
            }
            TagMatch::Any => {
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM tags WHERE tags.node_id = nodes.id AND tags.tag IN ({}))",
                    placeholders(&mut params, &filter.tags)
                ));
            }
        }
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY type, key");

    // SQLite needs a LIMIT clause to accept OFFSET; -1 means unbounded.
    let limit = query.limit.map(i64::from).unwrap_or(-1);
    params.push(Box::new(limit));
    sql.push_str(&format!(" LIMIT ?{}", params.len()));
    params.push(Box::new(i64::from(query.offset)));
    sql.push_str(&format!(" OFFSET ?{}", params.len()));

    let conn = store.conn();
    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), |row| {
        Ok(crate::model::Node {
            id: row.get(0)?,
            ty: row.get(1)?,
            key: row.get(2)?,
            title: row.get(3)?,
            state: row.get(4)?,
            created: row.get(5)?,
            updated: row.get(6)?,
            path: row.get(7)?,
            mtime_ns: row.get(8)?,
            size_bytes: row.get(9)?,
            hash: row.get(10)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        let node = row?;
        let tags = store.tags_for_node(&node.id)?;
        results.push(NodeInfo::from_node(&node, tags));
    }
    Ok(results)
}

fn placeholders(params: &mut Vec<Box<dyn rusqlite::types::ToSql>>, values: &[String]) -> String {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        params.push(Box::new(value.clone()));
        parts.push(format!("?{}", params.len()));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn seed(store: &mut Store) {
        let nodes = [
            ("n1", "note", "alpha", Some("open"), vec!["x", "y"]),
            ("n2", "note", "beta", Some("done"), vec!["x"]),
            ("n3", "task", "alpha", None, vec!["y"]),
        ];
        for (id, ty, key, state, tags) in nodes {
            store
                .upsert_node(&Node {
                    id: id.into(),
                    ty: ty.into(),
                    key: key.into(),
                    title: None,
                    state: state.map(str::to_string),
                    created: None,
                    updated: None,
                    path: format!("{ty}/{key}.Rmd"),
                    mtime_ns: 0,
                    size_bytes: 0,
                    hash: None,
                })
                .unwrap();
            let tags: Vec<String> = tags.into_iter().map(str::to_string).collect();
            store.replace_tags_for_node(id, &tags).unwrap();
        }
    }

    #[test]
    fn test_unfiltered_search_orders_by_type_key() {
        let mut store = Store::in_memory().unwrap();
        seed(&mut store);
        let results = search(&store, &SearchQuery::default()).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_type_and_state_filters() {
        let mut store = Store::in_memory().unwrap();
        seed(&mut store);
        let query = SearchQuery {
            filter: NodeFilter {
                types: vec!["note".into()],
                states: vec!["open".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        let results = search(&store, &query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "n1");
        assert_eq!(results[0].tags, vec!["x", "y"]);
    }

    #[test]
    fn test_tag_match_all_vs_any() {
        let mut store = Store::in_memory().unwrap();
        seed(&mut store);
        let mut query = SearchQuery {
            filter: NodeFilter {
                tags: vec!["x".into(), "y".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(search(&store, &query).unwrap().len(), 1);
        query.filter.tag_match = TagMatch::Any;
        assert_eq!(search(&store, &query).unwrap().len(), 3);
    }

    #[test]
    fn test_pagination() {
        let mut store = Store::in_memory().unwrap();
        seed(&mut store);
        let query = SearchQuery {
            limit: Some(1),
            offset: 1,
            ..Default::default()
        };
        let results = search(&store, &query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "n2");
    }
}
