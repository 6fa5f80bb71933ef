//! In-place operations on a `serde_json::Value` tree.
//!
//! `null` and empty objects count as "absent": writing either removes the
//! node, and parents left empty are pruned.

use serde_json::{Map, Value};

pub fn get_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments {
        node = node.as_object()?.get(seg)?;
    }
    if is_absent(node) {
        None
    } else {
        Some(node)
    }
}

pub fn set_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *root = if is_absent(&value) { Value::Null } else { value };
        return;
    };
    if !root.is_object() {
        if is_absent(&value) {
            return;
        }
        *root = Value::Object(Map::new());
    }
    let Value::Object(map) = root else { unreachable!() };

    if rest.is_empty() {
        if is_absent(&value) {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
    } else {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
        if is_absent(child) {
            map.remove(head);
        }
    }
    if map.is_empty() {
        *root = Value::Null;
    }
}

pub fn merge_at(root: &mut Value, segments: &[String], children: Map<String, Value>) {
    let mut path = segments.to_vec();
    for (key, value) in children {
        path.push(key);
        set_at(root, &path, value);
        path.pop();
    }
}

fn is_absent(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}
