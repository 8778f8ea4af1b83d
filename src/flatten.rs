//! Conversion between the nested quote tree and the flat key/value map.
//!
//! Repetition is carried by numeric key segments only: arrays in the tree are
//! leaves, and numeric segments unflatten to ordinary object keys.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::field_key::{ROOT, SEPARATOR};

pub type FlatMap = BTreeMap<String, String>;

/// Walks `tree` and emits `prefix.path = value` for every non-object leaf.
pub fn flatten(tree: &Value, prefix: &str) -> FlatMap {
    let mut out = FlatMap::new();
    flatten_into(tree, prefix, &mut out);
    out
}

pub fn flatten_data(tree: &Value) -> FlatMap {
    flatten(tree, ROOT)
}

fn flatten_into(value: &Value, path: &str, out: &mut FlatMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}{SEPARATOR}{key}");
                flatten_into(child, child_path.as_str(), out);
            }
        }
        leaf => {
            out.insert(path.to_string(), leaf_string(Some(leaf)));
        }
    }
}

/// Inverse of [`flatten`]. Keys outside `prefix` are skipped.
pub fn unflatten(flat: &FlatMap, prefix: &str) -> Value {
    let mut tree = json!({});
    let head = format!("{prefix}{SEPARATOR}");
    for (key, value) in flat {
        let Some(path) = key.strip_prefix(head.as_str()) else {
            warn!(key = key.as_str(), prefix, "skipping key outside prefix");
            continue;
        };
        merge_path(&mut tree, path, Value::String(value.clone()));
    }
    tree
}

pub fn unflatten_data(flat: &FlatMap) -> Value {
    unflatten(flat, ROOT)
}

/// Sets `path` (dotted, without prefix) inside `tree`, replacing any
/// non-object node met on the way.
pub fn merge_path(tree: &mut Value, path: &str, value: Value) {
    if !tree.is_object() {
        *tree = json!({});
    }
    let mut current = tree;
    let mut parts = path.split(SEPARATOR).peekable();
    while let Some(part) = parts.next() {
        let Some(obj) = current.as_object_mut() else {
            return;
        };
        if parts.peek().is_none() {
            obj.insert(part.to_string(), value);
            return;
        }
        let slot = obj
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot;
    }
}

/// Reads the string leaf at `path` (dotted, without prefix).
pub fn lookup_path<'a>(tree: &'a Value, path: &str) -> Option<&'a str> {
    let mut current = tree;
    for part in path.split(SEPARATOR) {
        current = current.as_object()?.get(part)?;
    }
    current.as_str()
}

pub fn leaf_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::Null) | None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(boolean)) => boolean.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|entry| leaf_string(Some(entry)))
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => String::new(),
    }
}
