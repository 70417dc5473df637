//! Tagged-variant configuration tree and whitespace normalization.
//!
//! Configuration arrives as an arbitrarily nested option tree. Before any
//! typed section is read from it, every string-valued leaf is stripped of
//! incidental leading/trailing whitespace so that selector strings and
//! endpoints compare cleanly. Enum-valued leaves and array-style properties
//! are deliberately left untouched.

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;

/// A single node in the configuration tree.
///
/// The tree is built from owned values, so back-references are impossible and
/// traversal always terminates.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    /// Explicit null; never visited by normalization.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar.
    Number(serde_json::Number),
    /// String leaf subject to whitespace trimming.
    String(String),
    /// Enum-valued leaf; byte-identical before and after normalization.
    Enum(String),
    /// Array-style property; not descended into.
    Indexed(Vec<ConfigNode>),
    /// Nested mapping from property name to child node.
    Composite(BTreeMap<String, ConfigNode>),
}

impl From<Value> for ConfigNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => Self::Number(number),
            // JSON carries no enum tag; plain strings are trimmable leaves.
            Value::String(text) => Self::String(text),
            Value::Array(items) => Self::Indexed(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => Self::Composite(
                entries
                    .into_iter()
                    .map(|(name, child)| (name, Self::from(child)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigNode> for Value {
    fn from(node: ConfigNode) -> Self {
        match node {
            ConfigNode::Null => Value::Null,
            ConfigNode::Bool(flag) => Value::Bool(flag),
            ConfigNode::Number(number) => Value::Number(number),
            ConfigNode::String(text) | ConfigNode::Enum(text) => Value::String(text),
            ConfigNode::Indexed(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            ConfigNode::Composite(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(name, child)| (name, Value::from(child)))
                    .collect(),
            ),
        }
    }
}

/// Trim leading/trailing whitespace from every reachable string leaf.
///
/// Breadth-first walk over the tree using an explicit worklist seeded with the
/// root. Per dequeued composite, each property is classified once: string
/// leaves are trimmed in place, nested composites are enqueued, and enum
/// leaves, indexed properties, and scalars are skipped. One pass, linear in
/// the number of reachable properties, infallible.
pub fn normalize(root: &mut ConfigNode) {
    let mut worklist: VecDeque<&mut ConfigNode> = VecDeque::new();
    worklist.push_back(root);

    while let Some(node) = worklist.pop_front() {
        let ConfigNode::Composite(children) = node else {
            continue;
        };
        for child in children.values_mut() {
            match child {
                ConfigNode::String(text) => {
                    let trimmed = text.trim();
                    if trimmed.len() != text.len() {
                        *text = trimmed.to_string();
                    }
                }
                ConfigNode::Composite(_) => worklist.push_back(child),
                // Enum, Indexed, Null, and non-string scalars are not touched.
                _ => {}
            }
        }
    }
}

/// Convert a raw JSON value into a tree, normalize it, and convert back.
pub fn normalize_value(raw: Value) -> Value {
    let mut tree = ConfigNode::from(raw);
    normalize(&mut tree);
    Value::from(tree)
}
