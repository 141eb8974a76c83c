// src/task.rs

//! Task declarations and collected task objects.
//!
//! [`TaskDecl`] / [`TaskModule`] / [`Project`] are the declaration side —
//! the module-loader seam the collection engine walks. [`Task`] is the
//! collected side: one concrete unit of work with resolved artifact
//! references into the node arena.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::exec::context::TaskContext;
use crate::marks::{Mark, MarkSet, MarkValue};
use crate::types::{TaskId, TaskResult};

/// A task callable. Receives the resolved dependency/product context and
/// reports back through the sum-typed [`TaskResult`] channel.
pub type TaskFn = Arc<dyn Fn(&TaskContext) -> TaskResult + Send + Sync>;

/// Shape-preserving container for declared artifacts: a single
/// descriptor, a sequence, or a string-keyed mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape<T> {
    Single(T),
    Seq(Vec<T>),
    Map(BTreeMap<String, T>),
}

impl<T> Shape<T> {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        match self {
            Shape::Single(v) => Box::new(std::iter::once(v)),
            Shape::Seq(vs) => Box::new(vs.iter()),
            Shape::Map(m) => Box::new(m.values()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Shape::Single(_) => 1,
            Shape::Seq(vs) => vs.len(),
            Shape::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sole element, if the shape is `Single`.
    pub fn single(&self) -> Option<&T> {
        match self {
            Shape::Single(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        match self {
            Shape::Single(v) if index == 0 => Some(v),
            Shape::Seq(vs) => vs.get(index),
            _ => None,
        }
    }

    pub fn get_named(&self, key: &str) -> Option<&T> {
        match self {
            Shape::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn map_values<U>(&self, mut f: impl FnMut(&T) -> U) -> Shape<U> {
        match self {
            Shape::Single(v) => Shape::Single(f(v)),
            Shape::Seq(vs) => Shape::Seq(vs.iter().map(&mut f).collect()),
            Shape::Map(m) => Shape::Map(m.iter().map(|(k, v)| (k.clone(), f(v))).collect()),
        }
    }

    pub fn try_map_values<U, E>(
        &self,
        mut f: impl FnMut(&T) -> std::result::Result<U, E>,
    ) -> std::result::Result<Shape<U>, E> {
        Ok(match self {
            Shape::Single(v) => Shape::Single(f(v)?),
            Shape::Seq(vs) => {
                let mut out = Vec::with_capacity(vs.len());
                for v in vs {
                    out.push(f(v)?);
                }
                Shape::Seq(out)
            }
            Shape::Map(m) => {
                let mut out = BTreeMap::new();
                for (k, v) in m {
                    out.insert(k.clone(), f(v)?);
                }
                Shape::Map(out)
            }
        })
    }
}

/// One declared callable inside a module.
#[derive(Clone)]
pub struct TaskDecl {
    pub name: String,
    pub marks: MarkSet,
    pub func: TaskFn,
    /// User-supplied digest standing in for the callable's source bytes
    /// when computing the task hash.
    pub digest: Option<String>,
}

impl TaskDecl {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            marks: MarkSet::new(),
            func: Arc::new(func),
            digest: None,
        }
    }

    /// Attach a mark, builder style.
    pub fn mark(mut self, mark: Mark) -> Self {
        self.marks.attach(mark);
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

impl fmt::Debug for TaskDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDecl")
            .field("name", &self.name)
            .field("marks", &self.marks)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

/// A module of declarations, identified by a (virtual or real) file path.
#[derive(Debug, Clone, Default)]
pub struct TaskModule {
    pub path: PathBuf,
    pub decls: Vec<TaskDecl>,
}

impl TaskModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            decls: Vec::new(),
        }
    }

    pub fn decl(mut self, decl: TaskDecl) -> Self {
        self.decls.push(decl);
        self
    }
}

/// The registered project tree the collection engine walks.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub modules: Vec<TaskModule>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, module: TaskModule) -> Self {
        self.modules.push(module);
        self
    }
}

/// A collected, concrete task. Artifact references are indices into the
/// run's node arena; the object is read-only once resolution finishes.
#[derive(Clone)]
pub struct Task {
    pub id: TaskId,
    /// Short name including the parametrization suffix.
    pub name: String,
    pub module: PathBuf,
    pub func: TaskFn,
    pub deps: Option<Shape<usize>>,
    pub products: Option<Shape<usize>>,
    /// Bound parametrization arguments, by argument name.
    pub params: BTreeMap<String, MarkValue>,
    pub marks: MarkSet,
    pub try_first: bool,
    pub try_last: bool,
    pub digest: Option<String>,
}

impl Task {
    pub fn dep_indices(&self) -> Vec<usize> {
        self.deps
            .as_ref()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn product_indices(&self) -> Vec<usize> {
        self.products
            .as_ref()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("deps", &self.deps)
            .field("products", &self.products)
            .field("try_first", &self.try_first)
            .field("try_last", &self.try_last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskSignal;

    #[test]
    fn shape_accessors_follow_the_declared_form() {
        let single = Shape::Single(7usize);
        assert_eq!(single.single(), Some(&7));
        assert_eq!(single.get_index(0), Some(&7));

        let seq = Shape::Seq(vec![1usize, 2, 3]);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get_index(2), Some(&3));
        assert_eq!(seq.single(), None);

        let map = Shape::Map(BTreeMap::from([("a".to_string(), 5usize)]));
        assert_eq!(map.get_named("a"), Some(&5));
        assert_eq!(map.get_named("b"), None);
    }

    #[test]
    fn decl_builder_accumulates_marks_in_order() {
        let decl = TaskDecl::new("task_x", |_| Ok(TaskSignal::Done))
            .mark(crate::marks::try_first())
            .mark(crate::marks::depends_on("in.txt"));
        assert_eq!(decl.marks.get_all().len(), 2);
        assert_eq!(decl.marks.get_all()[0].name, "try_first");
    }
}
