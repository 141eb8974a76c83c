// src/exec/context.rs

//! The resolved view of a task's artifacts handed to its callable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;

use crate::marks::MarkValue;
use crate::nodes::{Node, NodeArena};
use crate::task::{Shape, Task};
use crate::types::TaskId;

/// One artifact as seen from inside a task callable.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    Path(PathBuf),
    Value { key: String, payload: MarkValue },
}

impl ResolvedNode {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedNode::Path(p) => Some(p),
            ResolvedNode::Value { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&MarkValue> {
        match self {
            ResolvedNode::Path(_) => None,
            ResolvedNode::Value { payload, .. } => Some(payload),
        }
    }

    fn from_node(node: &Node) -> Self {
        match node {
            Node::Path(p) => ResolvedNode::Path(p.path.clone()),
            Node::Value(v) => ResolvedNode::Value {
                key: v.key.clone(),
                payload: v.payload.clone(),
            },
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    task_id: TaskId,
    deps: Option<Shape<ResolvedNode>>,
    products: Option<Shape<ResolvedNode>>,
    params: BTreeMap<String, MarkValue>,
}

/// Read-only context bound to one task invocation. Cheap to clone and
/// safe to move across threads.
#[derive(Debug, Clone)]
pub struct TaskContext {
    inner: Arc<ContextInner>,
}

impl TaskContext {
    pub(crate) fn new(task: &Task, arena: &NodeArena) -> Self {
        let resolve =
            |shape: &Shape<usize>| shape.map_values(|&idx| ResolvedNode::from_node(arena.get(idx)));
        Self {
            inner: Arc::new(ContextInner {
                task_id: task.id.clone(),
                deps: task.deps.as_ref().map(resolve),
                products: task.products.as_ref().map(resolve),
                params: task.params.clone(),
            }),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    pub fn deps(&self) -> Option<&Shape<ResolvedNode>> {
        self.inner.deps.as_ref()
    }

    pub fn products(&self) -> Option<&Shape<ResolvedNode>> {
        self.inner.products.as_ref()
    }

    /// The single declared dependency.
    pub fn dep(&self) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .deps
            .as_ref()
            .and_then(|s| s.single())
            .ok_or_else(|| anyhow!("task '{}' has no single dependency", self.task_id()))
    }

    pub fn dep_at(&self, index: usize) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .deps
            .as_ref()
            .and_then(|s| s.get_index(index))
            .ok_or_else(|| anyhow!("task '{}' has no dependency #{index}", self.task_id()))
    }

    pub fn dep_named(&self, key: &str) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .deps
            .as_ref()
            .and_then(|s| s.get_named(key))
            .ok_or_else(|| anyhow!("task '{}' has no dependency '{key}'", self.task_id()))
    }

    /// Path of the single declared dependency.
    pub fn dep_path(&self) -> anyhow::Result<&Path> {
        self.dep()?
            .path()
            .ok_or_else(|| anyhow!("dependency of '{}' is not a path", self.task_id()))
    }

    /// The single declared product.
    pub fn product(&self) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .products
            .as_ref()
            .and_then(|s| s.single())
            .ok_or_else(|| anyhow!("task '{}' has no single product", self.task_id()))
    }

    pub fn product_at(&self, index: usize) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .products
            .as_ref()
            .and_then(|s| s.get_index(index))
            .ok_or_else(|| anyhow!("task '{}' has no product #{index}", self.task_id()))
    }

    pub fn product_named(&self, key: &str) -> anyhow::Result<&ResolvedNode> {
        self.inner
            .products
            .as_ref()
            .and_then(|s| s.get_named(key))
            .ok_or_else(|| anyhow!("task '{}' has no product '{key}'", self.task_id()))
    }

    /// Path of the single declared product.
    pub fn product_path(&self) -> anyhow::Result<&Path> {
        self.product()?
            .path()
            .ok_or_else(|| anyhow!("product of '{}' is not a path", self.task_id()))
    }

    /// Bound parametrization argument.
    pub fn param(&self, name: &str) -> Option<&MarkValue> {
        self.inner.params.get(name)
    }
}
