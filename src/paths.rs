//! Conversion between dotted field paths and nested field trees.
//!
//! `["partner_id.name", "partner_id.email", "amount"]` becomes
//! `{"amount": true, "partner_id": {"email": true, "name": true}}` and back.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// One node of a [`FieldTree`]: either "fetch this field" or a sub-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldNode {
    Leaf,
    Branch(FieldTree),
}

impl FieldNode {
    /// Paths requested below this node when it sits at a relation position.
    ///
    /// A bare leaf means "identifier only".
    pub fn paths(&self) -> Vec<String> {
        match self {
            FieldNode::Leaf => vec!["id".to_string()],
            FieldNode::Branch(tree) => to_paths(tree),
        }
    }

    pub fn as_branch(&self) -> Option<&FieldTree> {
        match self {
            FieldNode::Branch(tree) => Some(tree),
            FieldNode::Leaf => None,
        }
    }
}

/// A set of field paths with shared prefixes merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTree {
    nodes: BTreeMap<String, FieldNode>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldNode> {
        self.nodes.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.nodes.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Top-level field names.
    pub fn fields(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldNode)> {
        self.nodes.iter()
    }

    /// Insert one dotted path, merging into existing branches.
    ///
    /// A branch absorbs a leaf of the same name: `a` plus `a.b` keeps `{a: {b}}`.
    pub fn insert_path(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        self.insert_segments(&segments);
    }

    fn insert_segments(&mut self, segments: &[&str]) {
        let Some((head, rest)) = segments.split_first() else {
            return;
        };
        if rest.is_empty() {
            self.nodes
                .entry(head.to_string())
                .or_insert(FieldNode::Leaf);
            return;
        }
        let node = self
            .nodes
            .entry(head.to_string())
            .or_insert_with(|| FieldNode::Branch(FieldTree::new()));
        if let FieldNode::Leaf = node {
            *node = FieldNode::Branch(FieldTree::new());
        }
        if let FieldNode::Branch(tree) = node {
            tree.insert_segments(rest);
        }
    }

    /// JSON rendering: `true` for leaves, objects for branches.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .nodes
            .iter()
            .map(|(name, node)| {
                let value = match node {
                    FieldNode::Leaf => Value::Bool(true),
                    FieldNode::Branch(tree) => tree.to_value(),
                };
                (name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

/// Build a tree from dotted paths.
pub fn to_tree<I, S>(paths: I) -> FieldTree
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tree = FieldTree::new();
    for path in paths {
        tree.insert_path(path.as_ref());
    }
    tree
}

/// Flatten a tree back into dotted leaf paths.
pub fn to_paths(tree: &FieldTree) -> Vec<String> {
    let mut paths = Vec::new();
    for (name, node) in tree.iter() {
        match node {
            FieldNode::Branch(sub) if !sub.is_empty() => {
                paths.extend(to_paths(sub).into_iter().map(|p| format!("{name}.{p}")));
            }
            _ => paths.push(name.clone()),
        }
    }
    paths
}

/// Dotted paths touched by a document.
///
/// Nested objects contribute their own paths, lists contribute the union of
/// their elements' paths (bare identifiers count as `id`), and anything else
/// is a leaf. Empty objects and lists still name their field.
pub fn document_paths(document: &Value) -> Vec<String> {
    let Value::Object(map) = document else {
        return Vec::new();
    };
    let mut paths = Vec::new();
    for (name, value) in map {
        let nested = match value {
            Value::Object(_) => document_paths(value),
            Value::Array(items) => {
                let mut merged: Vec<String> = Vec::new();
                for item in items {
                    let item_paths = match item {
                        Value::Object(_) => document_paths(item),
                        _ => vec!["id".to_string()],
                    };
                    for path in item_paths {
                        if !merged.contains(&path) {
                            merged.push(path);
                        }
                    }
                }
                merged
            }
            _ => Vec::new(),
        };
        if nested.is_empty() {
            paths.push(name.clone());
        } else {
            paths.extend(nested.into_iter().map(|p| format!("{name}.{p}")));
        }
    }
    paths
}

/// Split a comma-separated `schema` parameter into trimmed paths.
pub fn parse_field_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn shared_prefixes_merge() {
        let tree = to_tree(["a.b", "a.c"]);
        assert_eq!(tree.to_value(), json!({"a": {"b": true, "c": true}}));
    }

    #[test]
    fn deep_merge_keeps_siblings() {
        let tree = to_tree(["a.b.c", "a.b.d", "a.e", "f"]);
        assert_eq!(
            tree.to_value(),
            json!({"a": {"b": {"c": true, "d": true}, "e": true}, "f": true})
        );
    }

    #[test]
    fn round_trip_is_order_independent() {
        let paths = vec![
            "partner_id.name".to_string(),
            "amount".to_string(),
            "line_ids.product_id.code".to_string(),
            "line_ids.quantity".to_string(),
            "partner_id.country_id.code".to_string(),
        ];
        let back = to_paths(&to_tree(&paths));
        assert_eq!(sorted(back), sorted(paths));
    }

    #[test]
    fn branch_absorbs_leaf() {
        let tree = to_tree(["a", "a.b"]);
        assert_eq!(tree.to_value(), json!({"a": {"b": true}}));
        let tree = to_tree(["a.b", "a"]);
        assert_eq!(tree.to_value(), json!({"a": {"b": true}}));
    }

    #[test]
    fn leaf_at_relation_means_identifier() {
        assert_eq!(FieldNode::Leaf.paths(), vec!["id".to_string()]);
        let tree = to_tree(["partner_id.name"]);
        assert_eq!(
            tree.get("partner_id").unwrap().paths(),
            vec!["name".to_string()]
        );
    }

    #[test]
    fn empty_segments_are_ignored() {
        let tree = to_tree(["", "a..b"]);
        assert_eq!(tree.to_value(), json!({"a": {"b": true}}));
    }

    #[test]
    fn document_paths_flatten_lists_and_dedupe() {
        let doc = json!({
            "name": "Acme",
            "partner_id": {"id": 7},
            "line_ids": [
                {"name": "a", "quantity": 1},
                {"name": "b"},
                3
            ],
            "tag_ids": []
        });
        let paths = sorted(document_paths(&doc));
        assert_eq!(
            paths,
            vec![
                "line_ids.id",
                "line_ids.name",
                "line_ids.quantity",
                "name",
                "partner_id.id",
                "tag_ids"
            ]
        );
    }

    #[test]
    fn parse_field_list_trims() {
        assert_eq!(
            parse_field_list(" name , partner_id.name,,"),
            vec!["name".to_string(), "partner_id.name".to_string()]
        );
    }
}
