// src/hooks.rs

//! Typed hook bus.
//!
//! Every extensibility point is a [`Hook`] with a fixed calling convention:
//!
//! - **first-non-null**: listeners run in priority order; the first
//!   non-`None` result wins and later listeners are not invoked.
//! - **collect-all**: every listener runs; failures are annotated and
//!   returned next to the partial results.
//! - **wrapper**: first-non-null plus wrapper listeners that intercept the
//!   call, delegate once to the inner chain, and may observe or replace
//!   the aggregated result.
//!
//! Listener order within a hook: `try_first` registrations, then plain
//! ones, then `try_last`, each bucket in registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::TaskdagError;
use crate::exec::context::TaskContext;
use crate::exec::fingerprint;
use crate::fs::FileSystem;
use crate::marks::{MarkSet, MarkValue};
use crate::nodes::{Fingerprint, Node, ValueDescriptor};
use crate::report::CapturedError;
use crate::task::{Shape, TaskFn};
use crate::types::{TaskId, TaskSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookConvention {
    FirstNonNull,
    CollectAll,
    Wrapper,
}

impl fmt::Display for HookConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookConvention::FirstNonNull => "first-non-null",
            HookConvention::CollectAll => "collect-all",
            HookConvention::Wrapper => "wrapper",
        };
        f.write_str(s)
    }
}

/// Failure of one listener, annotated with its hook and label.
#[derive(Debug, Clone)]
pub struct HookError {
    pub hook: String,
    pub listener: String,
    pub message: String,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hook '{}' listener '{}' failed: {}",
            self.hook, self.listener, self.message
        )
    }
}

impl From<HookError> for TaskdagError {
    fn from(e: HookError) -> Self {
        TaskdagError::Hook {
            hook: e.hook,
            listener: e.listener,
            message: e.message,
        }
    }
}

/// Result of a collect-all dispatch: partial results plus per-listener
/// error annotations.
#[derive(Debug)]
pub struct HookOutcome<R> {
    pub results: Vec<R>,
    pub errors: Vec<HookError>,
}

impl<R> Default for HookOutcome<R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Registration-time priority, mirroring task ordering hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookPriority {
    TryFirst,
    #[default]
    Normal,
    TryLast,
}

impl HookPriority {
    fn bucket(self) -> u8 {
        match self {
            HookPriority::TryFirst => 0,
            HookPriority::Normal => 1,
            HookPriority::TryLast => 2,
        }
    }
}

type ListenerFn<A, R> = Box<dyn Fn(&A) -> Result<Option<R>, String> + Send + Sync>;

/// The inner chain handed to a wrapper listener.
pub type InnerCall<'c, R> = &'c mut dyn FnMut() -> Result<Option<R>, HookError>;

type WrapperFn<A, R> =
    Box<dyn for<'c> Fn(&A, InnerCall<'c, R>) -> Result<Option<R>, HookError> + Send + Sync>;

struct Registration<A, R> {
    label: String,
    bucket: u8,
    func: ListenerFn<A, R>,
}

/// One named hook point.
pub struct Hook<A, R> {
    name: &'static str,
    convention: HookConvention,
    listeners: Vec<Registration<A, R>>,
    wrappers: Vec<(String, WrapperFn<A, R>)>,
    blocked: bool,
}

impl<A, R> Hook<A, R> {
    pub fn new(name: &'static str, convention: HookConvention) -> Self {
        Self {
            name,
            convention,
            listeners: Vec::new(),
            wrappers: Vec::new(),
            blocked: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn convention(&self) -> HookConvention {
        self.convention
    }

    pub fn register<F>(&mut self, label: &str, func: F)
    where
        F: Fn(&A) -> Result<Option<R>, String> + Send + Sync + 'static,
    {
        self.register_with(label, HookPriority::Normal, func);
    }

    pub fn register_with<F>(&mut self, label: &str, priority: HookPriority, func: F)
    where
        F: Fn(&A) -> Result<Option<R>, String> + Send + Sync + 'static,
    {
        self.listeners.push(Registration {
            label: label.to_string(),
            bucket: priority.bucket(),
            func: Box::new(func),
        });
        // Stable sort keeps registration order within a bucket.
        self.listeners.sort_by_key(|r| r.bucket);
    }

    pub fn register_wrapper<F>(&mut self, label: &str, func: F)
    where
        F: for<'c> Fn(&A, InnerCall<'c, R>) -> Result<Option<R>, HookError>
            + Send
            + Sync
            + 'static,
    {
        self.wrappers.push((label.to_string(), Box::new(func)));
    }

    /// Turn every call into a no-op.
    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn unblock(&mut self) {
        self.blocked = false;
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Labels of active listeners, wrappers first, for diagnostics.
    pub fn listener_labels(&self) -> Vec<String> {
        self.wrappers
            .iter()
            .map(|(label, _)| format!("{label} (wrapper)"))
            .chain(self.listeners.iter().map(|r| r.label.clone()))
            .collect()
    }

    /// First-non-null dispatch, going through wrappers outermost-first.
    pub fn call_first(&self, args: &A) -> Result<Option<R>, HookError> {
        if self.blocked {
            return Ok(None);
        }
        self.call_wrapped(0, args)
    }

    fn call_wrapped(&self, depth: usize, args: &A) -> Result<Option<R>, HookError> {
        match self.wrappers.get(depth) {
            None => self.call_listeners(args),
            Some((_, wrapper)) => {
                let mut inner = || self.call_wrapped(depth + 1, args);
                wrapper(args, &mut inner)
            }
        }
    }

    fn call_listeners(&self, args: &A) -> Result<Option<R>, HookError> {
        for reg in &self.listeners {
            match (reg.func)(args) {
                Ok(Some(result)) => return Ok(Some(result)),
                Ok(None) => continue,
                Err(message) => {
                    return Err(HookError {
                        hook: self.name.to_string(),
                        listener: reg.label.clone(),
                        message,
                    })
                }
            }
        }
        Ok(None)
    }

    /// Collect-all dispatch. Listener failures never abort the call.
    pub fn call_all(&self, args: &A) -> HookOutcome<R> {
        let mut outcome = HookOutcome::default();
        if self.blocked {
            return outcome;
        }
        for reg in &self.listeners {
            match (reg.func)(args) {
                Ok(Some(result)) => outcome.results.push(result),
                Ok(None) => {}
                Err(message) => outcome.errors.push(HookError {
                    hook: self.name.to_string(),
                    listener: reg.label.clone(),
                    message,
                }),
            }
        }
        outcome
    }
}

/// Arguments of the `collect_node` hook: one leaf descriptor plus the
/// directory of the declaring module for relative path resolution.
#[derive(Debug, Clone)]
pub struct CollectNodeCall {
    pub descriptor: MarkValue,
    pub base_dir: PathBuf,
}

/// Arguments of the `collect_task` hook. A listener returning a blueprint
/// replaces the built-in task construction for this declaration.
#[derive(Clone)]
pub struct CollectTaskCall {
    pub module: PathBuf,
    pub name: String,
    pub marks: MarkSet,
}

/// Replacement dependency/product structure produced by a `collect_task`
/// listener.
#[derive(Debug, Clone)]
pub struct TaskBlueprint {
    pub deps: Option<Shape<Node>>,
    pub products: Option<Shape<Node>>,
}

#[derive(Debug, Clone)]
pub struct NodeFingerprintCall {
    pub node: Node,
}

/// Arguments of the `task_execute` hook: everything needed to invoke the
/// callable.
#[derive(Clone)]
pub struct TaskExecuteCall {
    pub task_id: TaskId,
    pub func: TaskFn,
    pub ctx: TaskContext,
}

/// User-level result of running a task callable: a signal, or the
/// captured failure.
pub type TaskCallResult = std::result::Result<TaskSignal, CapturedError>;

/// Diagnostic view of one hook point.
#[derive(Debug, Clone)]
pub struct HookInfo {
    pub name: &'static str,
    pub convention: HookConvention,
    pub listeners: Vec<String>,
}

/// The full hook surface of a session.
///
/// Field names are the hook names; calling conventions are per-hook
/// constants fixed at construction.
pub struct HookRegistry {
    pub collect_node: Hook<CollectNodeCall, Node>,
    pub collect_task: Hook<CollectTaskCall, TaskBlueprint>,
    pub node_fingerprint: Hook<NodeFingerprintCall, Fingerprint>,
    pub task_execute: Hook<TaskExecuteCall, TaskCallResult>,
    pub report_task: Hook<crate::report::ExecutionReport, ()>,
}

impl HookRegistry {
    /// Build a registry with the default listeners registered.
    ///
    /// `fs` and `small_file_threshold` parameterize the default path-node
    /// fingerprinting listener.
    pub fn new(fs: Arc<dyn FileSystem>, small_file_threshold: u64) -> Self {
        let mut collect_node = Hook::new("collect_node", HookConvention::FirstNonNull);
        let collect_task = Hook::new("collect_task", HookConvention::FirstNonNull);
        let mut node_fingerprint = Hook::new("node_fingerprint", HookConvention::FirstNonNull);
        let mut task_execute = Hook::new("task_execute", HookConvention::Wrapper);
        let report_task = Hook::new("report_task", HookConvention::CollectAll);

        // Default listeners run last so user registrations take precedence.
        collect_node.register_with(
            "taskdag:collect_node",
            HookPriority::TryLast,
            default_collect_node,
        );

        let fp_fs = Arc::clone(&fs);
        node_fingerprint.register_with(
            "taskdag:node_fingerprint",
            HookPriority::TryLast,
            move |call: &NodeFingerprintCall| {
                Ok(Some(fingerprint::node_fingerprint(
                    &call.node,
                    fp_fs.as_ref(),
                    small_file_threshold,
                )))
            },
        );

        task_execute.register_with(
            "taskdag:task_execute",
            HookPriority::TryLast,
            |call: &TaskExecuteCall| Ok(Some(crate::exec::invoke_callable(call))),
        );

        Self {
            collect_node,
            collect_task,
            node_fingerprint,
            task_execute,
            report_task,
        }
    }

    /// Block a hook by name. Returns `false` for an unknown name.
    pub fn block(&mut self, name: &str) -> bool {
        match name {
            "collect_node" => self.collect_node.block(),
            "collect_task" => self.collect_task.block(),
            "node_fingerprint" => self.node_fingerprint.block(),
            "task_execute" => self.task_execute.block(),
            "report_task" => self.report_task.block(),
            _ => return false,
        }
        true
    }

    /// Active listeners per hook, for diagnostics.
    pub fn describe(&self) -> Vec<HookInfo> {
        vec![
            HookInfo {
                name: self.collect_node.name(),
                convention: self.collect_node.convention(),
                listeners: self.collect_node.listener_labels(),
            },
            HookInfo {
                name: self.collect_task.name(),
                convention: self.collect_task.convention(),
                listeners: self.collect_task.listener_labels(),
            },
            HookInfo {
                name: self.node_fingerprint.name(),
                convention: self.node_fingerprint.convention(),
                listeners: self.node_fingerprint.listener_labels(),
            },
            HookInfo {
                name: self.task_execute.name(),
                convention: self.task_execute.convention(),
                listeners: self.task_execute.listener_labels(),
            },
            HookInfo {
                name: self.report_task.name(),
                convention: self.report_task.convention(),
                listeners: self.report_task.listener_labels(),
            },
        ]
    }
}

/// Built-in `collect_node` listener: path-like descriptors become path
/// nodes (relative to the declaring module), value descriptors become
/// value nodes. Anything else is left for other listeners.
fn default_collect_node(call: &CollectNodeCall) -> Result<Option<Node>, String> {
    match &call.descriptor {
        MarkValue::Path(p) => Ok(Some(Node::path(resolve_path(&call.base_dir, p)))),
        MarkValue::Str(s) => Ok(Some(Node::path(resolve_path(
            &call.base_dir,
            std::path::Path::new(s),
        )))),
        MarkValue::Opaque(o) => match o.as_any().downcast_ref::<ValueDescriptor>() {
            Some(v) => Ok(Some(Node::value(v.key.clone(), v.payload.clone()))),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Join relative descriptors onto the module directory and normalize
/// lexically (`.` and `..` segments), without touching the filesystem.
pub(crate) fn resolve_path(base_dir: &std::path::Path, path: &std::path::Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };

    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    let mut prefix = PathBuf::new();
    for component in joined.components() {
        use std::path::Component;
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => prefix.push(std::path::MAIN_SEPARATOR.to_string()),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    parts.push("..".into());
                }
            }
            Component::Normal(part) => parts.push(part.to_os_string()),
        }
    }
    let mut out = prefix;
    for part in parts {
        out.push(part);
    }
    out
}

/// Mapping from marker name to description, exposed for the whitelist and
/// the `markers` subcommand.
pub fn known_markers(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = crate::marks::reserved_markers()
        .iter()
        .map(|(name, desc)| (name.to_string(), desc.to_string()))
        .collect();
    for (name, desc) in extra {
        out.entry(name.clone()).or_insert_with(|| desc.clone());
    }
    out
}
