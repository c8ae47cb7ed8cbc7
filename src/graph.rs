//! In-memory graph store: an id-indexed arena of nodes.
//!
//! Edges are stored only as `depends_on` lists on the consumer. The reverse
//! direction (who depends on me) is derived on demand so that a state edited
//! through [`DagState::node_mut`] can never disagree with a cached index.

use crate::store::DagError;
use crate::types::{Node, NodeType};
use eyre::{Context, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Current persisted format version.
pub const SCHEMA_VERSION: u32 = 1;

/// The whole dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DagState {
    schema_version: u32,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Default for DagState {
    fn default() -> Self {
        Self::new()
    }
}

impl DagState {
    /// An empty graph at the current schema version.
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of `depends_on` entries across all nodes.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.depends_on.len()).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Raw mutable access to a node, bypassing every invariant check.
    ///
    /// Intended for repair tooling and tests. Changing `id` through this handle
    /// is not supported; use the query engine's `validate` afterwards.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let i = *self.index.get(id)?;
        self.nodes.get_mut(i)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    /// Append a node. Callers have already checked the id is free.
    pub(crate) fn insert(&mut self, node: Node) {
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Reverse adjacency: id -> ids that list it in `depends_on`.
    ///
    /// Only edges whose target exists are included; dependents appear in
    /// insertion order and each at most once.
    pub fn dependents_index(&self) -> HashMap<&str, Vec<&str>> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            for dep in &node.depends_on {
                if let Some(target) = self.get(dep) {
                    let entry = reverse.entry(target.id.as_str()).or_default();
                    if !entry.contains(&node.id.as_str()) {
                        entry.push(node.id.as_str());
                    }
                }
            }
        }
        reverse
    }

    /// Direct dependents of a node.
    pub fn direct_dependents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.depends_on.iter().any(|d| d == id))
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Parse a persisted graph document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse graph document")
    }

    /// Render the graph document, nodes in insertion order.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize graph document")
    }

    fn from_entries(schema_version: u32, entries: Vec<(String, Node)>) -> std::result::Result<Self, DagError> {
        let mut state = Self {
            schema_version,
            nodes: Vec::with_capacity(entries.len()),
            index: HashMap::with_capacity(entries.len()),
        };
        for (key, node) in entries {
            if key != node.id {
                return Err(DagError::KeyMismatch { key, id: node.id });
            }
            if state.contains(&node.id) {
                return Err(DagError::AlreadyExists(node.id));
            }
            state.insert(node);
        }
        Ok(state)
    }
}

struct OrderedNodes<'a>(&'a [Node]);

impl Serialize for OrderedNodes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for node in self.0 {
            map.serialize_entry(&node.id, node)?;
        }
        map.end()
    }
}

impl Serialize for DagState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut doc = serializer.serialize_struct("DagState", 2)?;
        doc.serialize_field("schemaVersion", &self.schema_version)?;
        doc.serialize_field("nodes", &OrderedNodes(&self.nodes))?;
        doc.end()
    }
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default, deserialize_with = "ordered_entries")]
    nodes: Vec<(String, Node)>,
}

/// Keep map entries in document order instead of collecting into a HashMap.
fn ordered_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, Node)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, Node)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of node id to node")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, node)) = map.next_entry::<String, Node>()? {
                entries.push((key, node));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

impl<'de> Deserialize<'de> for DagState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawDocument::deserialize(deserializer)?;
        DagState::from_entries(raw.schema_version, raw.nodes).map_err(de::Error::custom)
    }
}
