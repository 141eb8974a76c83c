// src/marks.rs

//! Declarative metadata attached to task declarations.
//!
//! A [`Mark`] is a `(name, positional args, keyword args)` tuple. Marks are
//! passive data; they only gain meaning when collection or execution
//! interprets them. Reserved names are listed in [`reserved_markers`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Open extension point for mark values the core does not interpret.
///
/// Custom node descriptors and id functions travel through this trait;
/// listeners downcast via [`OpaqueValue::as_any`].
pub trait OpaqueValue: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Stable token used when the value participates in ids or hashes.
    fn token(&self) -> Option<String> {
        None
    }
}

/// Argument value carried by a mark.
///
/// Sequences and maps nest; everything else is a leaf. `Opaque` is the
/// escape hatch for user-defined payloads.
#[derive(Clone, Debug)]
pub enum MarkValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
    Seq(Vec<MarkValue>),
    Map(BTreeMap<String, MarkValue>),
    Opaque(Arc<dyn OpaqueValue>),
}

impl MarkValue {
    pub fn seq<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<MarkValue>,
    {
        MarkValue::Seq(values.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MarkValue>,
    {
        MarkValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            MarkValue::Bool(_) | MarkValue::Int(_) | MarkValue::Float(_) | MarkValue::Str(_)
        )
    }

    /// Rendering used for auto-generated parametrization ids.
    ///
    /// Only scalar values produce a fragment; the caller substitutes
    /// `<argname><index>` for everything else.
    pub fn id_fragment(&self) -> Option<String> {
        match self {
            MarkValue::Bool(b) => Some(b.to_string()),
            MarkValue::Int(i) => Some(i.to_string()),
            MarkValue::Float(f) => Some(f.to_string()),
            MarkValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MarkValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MarkValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Stable textual rendering, used for task hashing.
    pub fn render(&self, out: &mut String) {
        match self {
            MarkValue::Bool(b) => out.push_str(&b.to_string()),
            MarkValue::Int(i) => out.push_str(&i.to_string()),
            MarkValue::Float(f) => out.push_str(&f.to_string()),
            MarkValue::Str(s) => {
                out.push('"');
                out.push_str(s);
                out.push('"');
            }
            MarkValue::Path(p) => out.push_str(&p.display().to_string()),
            MarkValue::Seq(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.render(out);
                }
                out.push(']');
            }
            MarkValue::Map(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push(':');
                    v.render(out);
                }
                out.push('}');
            }
            MarkValue::Opaque(o) => match o.token() {
                Some(token) => out.push_str(&token),
                None => out.push_str("<opaque>"),
            },
        }
    }
}

impl PartialEq for MarkValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MarkValue::Bool(a), MarkValue::Bool(b)) => a == b,
            (MarkValue::Int(a), MarkValue::Int(b)) => a == b,
            (MarkValue::Float(a), MarkValue::Float(b)) => a == b,
            (MarkValue::Str(a), MarkValue::Str(b)) => a == b,
            (MarkValue::Path(a), MarkValue::Path(b)) => a == b,
            (MarkValue::Seq(a), MarkValue::Seq(b)) => a == b,
            (MarkValue::Map(a), MarkValue::Map(b)) => a == b,
            (MarkValue::Opaque(a), MarkValue::Opaque(b)) => match (a.token(), b.token()) {
                (Some(ta), Some(tb)) => ta == tb,
                _ => Arc::ptr_eq(a, b),
            },
            _ => false,
        }
    }
}

impl From<bool> for MarkValue {
    fn from(v: bool) -> Self {
        MarkValue::Bool(v)
    }
}

impl From<i64> for MarkValue {
    fn from(v: i64) -> Self {
        MarkValue::Int(v)
    }
}

impl From<i32> for MarkValue {
    fn from(v: i32) -> Self {
        MarkValue::Int(v as i64)
    }
}

impl From<f64> for MarkValue {
    fn from(v: f64) -> Self {
        MarkValue::Float(v)
    }
}

impl From<&str> for MarkValue {
    fn from(v: &str) -> Self {
        MarkValue::Str(v.to_string())
    }
}

impl From<String> for MarkValue {
    fn from(v: String) -> Self {
        MarkValue::Str(v)
    }
}

impl From<PathBuf> for MarkValue {
    fn from(v: PathBuf) -> Self {
        MarkValue::Path(v)
    }
}

impl From<&Path> for MarkValue {
    fn from(v: &Path) -> Self {
        MarkValue::Path(v.to_path_buf())
    }
}

impl From<Vec<MarkValue>> for MarkValue {
    fn from(v: Vec<MarkValue>) -> Self {
        MarkValue::Seq(v)
    }
}

/// A single piece of metadata: `(name, args, kwargs)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mark {
    pub name: String,
    pub args: Vec<MarkValue>,
    pub kwargs: BTreeMap<String, MarkValue>,
}

impl Mark {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<MarkValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kw(mut self, key: impl Into<String>, value: impl Into<MarkValue>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn first_arg(&self) -> Option<&MarkValue> {
        self.args.first()
    }

    pub fn kwarg(&self, key: &str) -> Option<&MarkValue> {
        self.kwargs.get(key)
    }
}

/// Ordered set of marks attached to one task declaration.
///
/// Kept as a sidecar structure rather than an attribute on the callable;
/// attachment order is preserved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkSet {
    marks: Vec<Mark>,
}

impl MarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, mark: Mark) {
        self.marks.push(mark);
    }

    /// All marks, in attachment order.
    pub fn get_all(&self) -> &[Mark] {
        &self.marks
    }

    pub fn get(&self, name: &str) -> Vec<&Mark> {
        self.marks.iter().filter(|m| m.name == name).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.marks.iter().any(|m| m.name == name)
    }

    /// Remove all marks with the given name, returning them in order.
    pub fn remove(&mut self, name: &str) -> Vec<Mark> {
        let mut removed = Vec::new();
        self.marks.retain(|m| {
            if m.name == name {
                removed.push(m.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Replace the whole set.
    pub fn set(&mut self, marks: Vec<Mark>) {
        self.marks = marks;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mark> {
        self.marks.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Stable textual rendering, hashed into the task hash.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for mark in &self.marks {
            out.push('@');
            out.push_str(&mark.name);
            out.push('(');
            for (i, arg) in mark.args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                arg.render(&mut out);
            }
            for (key, value) in &mark.kwargs {
                out.push(',');
                out.push_str(key);
                out.push('=');
                value.render(&mut out);
            }
            out.push(')');
        }
        out
    }
}

/// Marker names the core interprets, with the descriptions shown by the
/// `markers` subcommand.
pub fn reserved_markers() -> &'static [(&'static str, &'static str)] {
    &[
        ("depends_on", "declare dependency artifacts of a task"),
        ("produces", "declare product artifacts of a task"),
        (
            "parametrize",
            "expand one declaration into many tasks over argument vectors",
        ),
        ("task", "collect a callable regardless of its name"),
        ("skip", "skip the task unconditionally"),
        ("skip_if", "skip the task when a condition holds"),
        (
            "skip_unchanged",
            "reserved: the outcome the engine assigns when fingerprints are up to date",
        ),
        (
            "skip_ancestor_failed",
            "reserved: the outcome the engine assigns when a predecessor failed",
        ),
        (
            "persist",
            "record current fingerprints instead of re-running when only products changed",
        ),
        ("try_first", "prefer this task among equally-ready tasks"),
        ("try_last", "defer this task among equally-ready tasks"),
    ]
}

pub fn skip() -> Mark {
    Mark::new("skip")
}

pub fn skip_if(condition: bool, reason: &str) -> Mark {
    Mark::new("skip_if").arg(condition).kw("reason", reason)
}

pub fn persist() -> Mark {
    Mark::new("persist")
}

/// Collect the declaration even when its name does not match the task
/// function pattern.
pub fn task() -> Mark {
    Mark::new("task")
}

/// Like [`task`], renaming the collected task.
pub fn task_named(name: &str) -> Mark {
    Mark::new("task").kw("name", name)
}

pub fn try_first() -> Mark {
    Mark::new("try_first")
}

pub fn try_last() -> Mark {
    Mark::new("try_last")
}

/// Declare dependencies. The descriptor may be a single value, a sequence,
/// or a mapping; the shape is preserved on the collected task.
pub fn depends_on(descriptor: impl Into<MarkValue>) -> Mark {
    Mark::new("depends_on").arg(descriptor)
}

/// Declare products, same shapes as [`depends_on`].
pub fn produces(descriptor: impl Into<MarkValue>) -> Mark {
    Mark::new("produces").arg(descriptor)
}

/// Parametrize over value rows. `argnames` is a comma-separated list; each
/// row binds all names (a row with several names is a sequence).
///
/// Explicit ids go through `.kw("ids", MarkValue::seq([...]))`, an id
/// function through `.kw("ids", marks::id_fn(...))`.
pub fn parametrize<I, V>(argnames: &str, rows: I) -> Mark
where
    I: IntoIterator<Item = V>,
    V: Into<MarkValue>,
{
    Mark::new("parametrize")
        .arg(argnames)
        .arg(MarkValue::seq(rows))
}

/// User-supplied id function for parametrized tasks.
pub struct IdFn(pub Arc<dyn Fn(&MarkValue) -> Option<String> + Send + Sync>);

impl fmt::Debug for IdFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdFn")
    }
}

impl OpaqueValue for IdFn {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn id_fn(f: impl Fn(&MarkValue) -> Option<String> + Send + Sync + 'static) -> MarkValue {
    MarkValue::Opaque(Arc::new(IdFn(Arc::new(f))))
}
