// src/nodes.rs

//! Artifact nodes and their fingerprints.
//!
//! A node is anything a task can depend on or produce. The capability set
//! is closed: identity, fingerprint, existence. New variants enter the
//! system through the `collect_node` and `node_fingerprint` hooks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;
use crate::marks::{MarkValue, OpaqueValue};
use crate::types::NodeId;

/// A filesystem artifact. Identity is the normalized absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathNode {
    pub path: PathBuf,
}

/// An opaque, user-provided artifact. Its fingerprint comes from the
/// `node_fingerprint` hook (falling back to the payload's stable token).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    pub key: String,
    pub payload: MarkValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Path(PathNode),
    Value(ValueNode),
}

impl Node {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Node::Path(PathNode { path: path.into() })
    }

    pub fn value(key: impl Into<String>, payload: impl Into<MarkValue>) -> Self {
        Node::Value(ValueNode {
            key: key.into(),
            payload: payload.into(),
        })
    }

    /// Stable identity, unique across a build.
    pub fn id(&self) -> NodeId {
        match self {
            Node::Path(p) => p.path.display().to_string(),
            Node::Value(v) => format!("value::{}", v.key),
        }
    }

    /// Short display name for reports and logs.
    pub fn name(&self) -> String {
        match self {
            Node::Path(p) => p
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.path.display().to_string()),
            Node::Value(v) => v.key.clone(),
        }
    }

    pub fn exists(&self, fs: &dyn FileSystem) -> bool {
        match self {
            Node::Path(p) => fs.is_file(&p.path),
            Node::Value(_) => true,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Node::Path(p) => Some(&p.path),
            Node::Value(_) => None,
        }
    }
}

/// Mark-value descriptor for a value node, understood by the built-in
/// `collect_node` listener. Build one with [`value_descriptor`].
#[derive(Debug, Clone)]
pub struct ValueDescriptor {
    pub key: String,
    pub payload: MarkValue,
}

impl OpaqueValue for ValueDescriptor {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn token(&self) -> Option<String> {
        Some(format!("value::{}", self.key))
    }
}

/// Wrap a key and payload into a descriptor usable inside `depends_on`
/// and `produces` marks.
pub fn value_descriptor(key: impl Into<String>, payload: impl Into<MarkValue>) -> MarkValue {
    MarkValue::Opaque(std::sync::Arc::new(ValueDescriptor {
        key: key.into(),
        payload: payload.into(),
    }))
}

/// A stable, comparable summary of a node's current state.
///
/// Fingerprints are compared by equality only; `Absent` is the
/// distinguished token for a missing artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fingerprint {
    Absent,
    Content { hash: String },
    SizeMtime { size: u64, mtime_ns: u64 },
    Value { token: String },
}

impl Fingerprint {
    pub fn is_absent(&self) -> bool {
        matches!(self, Fingerprint::Absent)
    }
}

/// Arena of interned nodes.
///
/// Nodes are deduplicated by identity; tasks and the graph refer to them
/// by index, and those indices double as stable handles for the run.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    by_id: HashMap<NodeId, usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a node, returning its index. A node with an identity seen
    /// before returns the existing index.
    pub fn intern(&mut self, node: Node) -> usize {
        let id = node.id();
        if let Some(&idx) = self.by_id.get(&id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.by_id.insert(id, idx);
        idx
    }

    pub fn get(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn id_of(&self, idx: usize) -> NodeId {
        self.nodes[idx].id()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes.iter().enumerate()
    }
}
