//! Untyped ESTree node access.
//!
//! The analyzer consumes syntax trees as raw [`serde_json::Value`]s shaped
//! like the output of standard ECMAScript parsers (esprima, acorn): every
//! node is an object with a `"type"` discriminator plus kind-specific
//! fields. This module provides the accessors the analyzer uses to read
//! those nodes, and [`NodeRef`], the lightweight provenance back-reference
//! carried through the produced graph instead of full node clones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};

/// The `"type"` tag of a node, or `""` for non-node values.
pub fn kind(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or("")
}

/// A required child field. Missing fields are a caller contract violation.
pub fn field<'a>(node: &'a Value, name: &str) -> Result<&'a Value> {
    node.get(name).ok_or_else(|| {
        FlowError::MalformedTree(format!("{} node missing `{}` field", kind(node), name))
    })
}

/// An optional child field; JSON `null` counts as absent.
pub fn opt_field<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    match node.get(name) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}

/// A required child field that must be an array of nodes.
pub fn array_field<'a>(node: &'a Value, name: &str) -> Result<&'a [Value]> {
    field(node, name)?.as_array().map(Vec::as_slice).ok_or_else(|| {
        FlowError::MalformedTree(format!("{} node `{}` field is not an array", kind(node), name))
    })
}

/// A required child field that must be a string.
pub fn str_field<'a>(node: &'a Value, name: &str) -> Result<&'a str> {
    field(node, name)?.as_str().ok_or_else(|| {
        FlowError::MalformedTree(format!("{} node `{}` field is not a string", kind(node), name))
    })
}

/// Provenance back-reference to an originating syntax node.
///
/// Carries the node kind and its source range when the parser emitted one
/// (`range: [start, end]` or acorn-style `start`/`end` offsets). Cheap to
/// clone; the graph stores these everywhere the source tree would otherwise
/// have to be referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node kind tag (`"Identifier"`, `"IfStatement"`, ...).
    pub kind: String,
    /// Byte range in the original source, if the parser recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(u64, u64)>,
}

impl NodeRef {
    /// Build a reference for a node.
    pub fn of(node: &Value) -> Self {
        NodeRef {
            kind: kind(node).to_string(),
            range: range_of(node),
        }
    }
}

fn range_of(node: &Value) -> Option<(u64, u64)> {
    if let Some(range) = node.get("range").and_then(Value::as_array) {
        if let (Some(start), Some(end)) = (
            range.first().and_then(Value::as_u64),
            range.get(1).and_then(Value::as_u64),
        ) {
            return Some((start, end));
        }
    }
    match (
        node.get("start").and_then(Value::as_u64),
        node.get("end").and_then(Value::as_u64),
    ) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    }
}

/// Preorder trace of every node kind in a subtree.
///
/// Used by the analyzer to fill the correlation trace stored on a closure's
/// reserved return/throw blocks. Walks object fields in source order and
/// array elements left to right; values without a `"type"` tag contribute
/// nothing themselves but are still descended into.
pub fn kind_trace(node: &Value) -> Vec<String> {
    let mut trace = Vec::new();
    collect_kinds(node, &mut trace);
    trace
}

fn collect_kinds(value: &Value, trace: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(tag) = map.get("type").and_then(Value::as_str) {
                trace.push(tag.to_string());
            }
            for (key, child) in map {
                // `regex`/`loc` style metadata objects never carry a `type`
                // tag, so descending into them is harmless.
                if key != "type" {
                    collect_kinds(child, trace);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_kinds(item, trace);
            }
        }
        _ => {}
    }
}
