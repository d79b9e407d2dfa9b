//! Normalized config trees and the single recursive merge/diff used by checking and
//! patch generation.
//!
//! Desired and derived configs are both lowered to a [`ConfigNode`]. Checking computes
//! `diff(merge(derived, desired), derived)`: the merge fills every field the desired
//! config leaves unspecified from the derived one, so only stated intent is compared.

use std::{collections::BTreeMap, fmt};

use alloy_core::primitives::Address;

use crate::format_address;

/// Canonical form of a config value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigNode {
    /// Scalar in canonical text form. Addresses are lowercase hex.
    Leaf(String),
    /// Fixed set of named fields. Fields missing from an overlay are filled from the base.
    Record(BTreeMap<String, ConfigNode>),
    /// One arm of a tagged enum. Arms with different tags never merge.
    Variant {
        tag: String,
        fields: BTreeMap<String, ConfigNode>,
    },
    /// Keyed collection whose key set is significant: extra keys are differences.
    Table(BTreeMap<String, ConfigNode>),
    /// Order-insensitive collection, kept sorted.
    List(Vec<ConfigNode>),
}

impl ConfigNode {
    pub fn leaf(value: impl fmt::Display) -> Self {
        Self::Leaf(value.to_string())
    }

    pub fn address(address: Address) -> Self {
        Self::Leaf(format_address(address))
    }

    pub fn addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self::list(addresses.into_iter().map(Self::address))
    }

    pub fn list(items: impl IntoIterator<Item = ConfigNode>) -> Self {
        let mut items: Vec<_> = items.into_iter().collect();
        items.sort();
        Self::List(items)
    }

    pub fn table<K: fmt::Display>(entries: impl IntoIterator<Item = (K, ConfigNode)>) -> Self {
        Self::Table(
            entries
                .into_iter()
                .map(|(key, node)| (key.to_string(), node))
                .collect(),
        )
    }

    /// Tag of a variant node.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Variant { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Named child of a record or variant.
    pub fn field(&self, name: &str) -> Option<&ConfigNode> {
        match self {
            Self::Record(fields) | Self::Variant { fields, .. } => fields.get(name),
            _ => None,
        }
    }

    /// JSON rendering used in violation reports.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Leaf(value) => Value::String(value.clone()),
            Self::Record(fields) | Self::Table(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_json()))
                    .collect(),
            ),
            Self::Variant { tag, fields } => {
                let mut object: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_json()))
                    .collect();
                object.insert("type".to_string(), Value::String(tag.clone()));
                Value::Object(object)
            }
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

/// Lower a config to its canonical tree.
pub trait ToConfigNode {
    fn to_config_node(&self) -> ConfigNode;
}

impl ToConfigNode for Address {
    fn to_config_node(&self) -> ConfigNode {
        ConfigNode::address(*self)
    }
}

/// Accumulates the fields of a record or variant node.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    fields: BTreeMap<String, ConfigNode>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, node: impl ToConfigNode) -> Self {
        self.fields.insert(name.to_string(), node.to_config_node());
        self
    }

    pub fn node(mut self, name: &str, node: ConfigNode) -> Self {
        self.fields.insert(name.to_string(), node);
        self
    }

    /// Add `node` only when present. An absent field means "unspecified".
    pub fn optional<T: ToConfigNode>(mut self, name: &str, node: Option<&T>) -> Self {
        if let Some(node) = node {
            self.fields.insert(name.to_string(), node.to_config_node());
        }
        self
    }

    pub fn record(self) -> ConfigNode {
        ConfigNode::Record(self.fields)
    }

    pub fn variant(self, tag: &str) -> ConfigNode {
        ConfigNode::Variant {
            tag: tag.to_string(),
            fields: self.fields,
        }
    }
}

impl ToConfigNode for ConfigNode {
    fn to_config_node(&self) -> ConfigNode {
        self.clone()
    }
}

impl ToConfigNode for bool {
    fn to_config_node(&self) -> ConfigNode {
        ConfigNode::leaf(self)
    }
}

impl ToConfigNode for u8 {
    fn to_config_node(&self) -> ConfigNode {
        ConfigNode::leaf(self)
    }
}

impl ToConfigNode for u64 {
    fn to_config_node(&self) -> ConfigNode {
        ConfigNode::leaf(self)
    }
}

fn merge_fields(
    base: &BTreeMap<String, ConfigNode>,
    overlay: &BTreeMap<String, ConfigNode>,
) -> BTreeMap<String, ConfigNode> {
    let mut merged = base.clone();
    for (key, node) in overlay {
        let value = match base.get(key) {
            Some(existing) => merge(existing, node),
            None => node.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Fill everything `overlay` leaves unspecified from `base`.
///
/// Tables keep exactly the overlay's keys; variants with different tags take the overlay
/// whole; every other shape mismatch also resolves to the overlay.
pub fn merge(base: &ConfigNode, overlay: &ConfigNode) -> ConfigNode {
    match (base, overlay) {
        (ConfigNode::Record(base), ConfigNode::Record(overlay)) => {
            ConfigNode::Record(merge_fields(base, overlay))
        }
        (
            ConfigNode::Variant {
                tag: base_tag,
                fields: base,
            },
            ConfigNode::Variant { tag, fields },
        ) if base_tag == tag => ConfigNode::Variant {
            tag: tag.clone(),
            fields: merge_fields(base, fields),
        },
        (ConfigNode::Table(base), ConfigNode::Table(overlay)) => ConfigNode::Table(
            overlay
                .iter()
                .map(|(key, node)| {
                    let merged = match base.get(key) {
                        Some(existing) => merge(existing, node),
                        None => node.clone(),
                    };
                    (key.clone(), merged)
                })
                .collect(),
        ),
        _ => overlay.clone(),
    }
}

/// One structural mismatch. `None` on either side means the entry is absent there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub path: String,
    pub expected: Option<ConfigNode>,
    pub actual: Option<ConfigNode>,
}

impl Difference {
    /// First path segment, which names the top-level field that differs.
    pub fn root(&self) -> &str {
        self.path.split('.').next().unwrap_or_default()
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn diff_fields(
    path: &str,
    expected: &BTreeMap<String, ConfigNode>,
    actual: &BTreeMap<String, ConfigNode>,
    out: &mut Vec<Difference>,
) {
    for (key, node) in expected {
        match actual.get(key) {
            Some(other) => diff_into(&join(path, key), node, other, out),
            None => out.push(Difference {
                path: join(path, key),
                expected: Some(node.clone()),
                actual: None,
            }),
        }
    }
    for (key, node) in actual {
        if !expected.contains_key(key) {
            out.push(Difference {
                path: join(path, key),
                expected: None,
                actual: Some(node.clone()),
            });
        }
    }
}

fn diff_into(path: &str, expected: &ConfigNode, actual: &ConfigNode, out: &mut Vec<Difference>) {
    match (expected, actual) {
        (ConfigNode::Record(expected), ConfigNode::Record(actual))
        | (ConfigNode::Table(expected), ConfigNode::Table(actual)) => {
            diff_fields(path, expected, actual, out)
        }
        (
            ConfigNode::Variant {
                tag: expected_tag,
                fields: expected_fields,
            },
            ConfigNode::Variant {
                tag: actual_tag,
                fields: actual_fields,
            },
        ) if expected_tag == actual_tag => diff_fields(path, expected_fields, actual_fields, out),
        _ if expected == actual => {}
        _ => out.push(Difference {
            path: path.to_string(),
            expected: Some(expected.clone()),
            actual: Some(actual.clone()),
        }),
    }
}

/// Every path at which `expected` and `actual` disagree, recursing key by key.
pub fn diff(expected: &ConfigNode, actual: &ConfigNode) -> Vec<Difference> {
    let mut out = Vec::new();
    diff_into("", expected, actual, &mut out);
    out
}

/// Differences between live state and the intent stated in `desired`.
pub fn check_against(desired: &ConfigNode, actual: &ConfigNode) -> Vec<Difference> {
    diff(&merge(actual, desired), actual)
}
