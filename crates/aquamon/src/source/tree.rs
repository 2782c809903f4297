//! Slash-path addressing inside a JSON record tree.
//!
//! Both backends keep a local copy of the database as a `serde_json::Value`
//! and apply writes to it the way the hosted database does: `null` deletes,
//! and objects left without children disappear.

use serde_json::Map;
use serde_json::Value;

/// Split a database path into its non-empty segments (`"/a//b/"` -> `["a", "b"]`).
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Normalize a path to its leading-slash form (`"a/b/"` -> `"/a/b"`).
pub fn normalize(path: &str) -> String {
    format!("/{}", segments(path).join("/"))
}

/// Look up the value stored at `path`. Null values count as absent.
pub fn get<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(*segment)?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Replace the value at `path`.
///
/// Writing `Value::Null` deletes the node; parents that end up empty are
/// removed as well.
pub fn set(root: &mut Value, path: &[&str], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *root = prune(value);
        return;
    };

    if !root.is_object() {
        if value.is_null() {
            return;
        }
        *root = Value::Object(Map::new());
    }

    if let Value::Object(map) = root {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set(child, rest, value);
        if child.is_null() {
            map.remove(*head);
        }
    }

    if root.as_object().is_some_and(Map::is_empty) {
        *root = Value::Null;
    }
}

/// Apply a multi-child update at `path`: each key is `set` independently,
/// siblings not named in `children` are left untouched.
pub fn merge(root: &mut Value, path: &[&str], children: Map<String, Value>) {
    for (key, value) in children {
        let mut child_path = path.to_vec();
        child_path.extend(segments(&key));
        set(root, &child_path, value);
    }
}

/// Drop nulls and empty objects from incoming data.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        other => other,
    }
}
