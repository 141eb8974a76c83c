// src/collect/mod.rs

//! Collection engine.
//!
//! Walks the registered project tree, selects modules by file pattern and
//! ignore globs, selects declarations by name pattern or `task` mark,
//! expands parametrizations, and materializes [`Task`] objects with their
//! artifact nodes interned in the arena. One [`CollectionReport`] is
//! emitted per considered item.

pub mod parametrize;
pub mod select;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::config::Config;
use crate::errors::{Result, TaskdagError};
use crate::hooks::{known_markers, CollectNodeCall, CollectTaskCall, HookRegistry};
use crate::marks::{MarkSet, MarkValue};
use crate::nodes::{Node, NodeArena};
use crate::report::{CapturedError, CollectionReport};
use crate::task::{Project, Shape, Task, TaskDecl};

use parametrize::Expansion;
use select::Selector;

#[derive(Debug)]
pub struct CollectionOutcome {
    pub tasks: Vec<Task>,
    pub reports: Vec<CollectionReport>,
}

impl CollectionOutcome {
    pub fn has_failures(&self) -> bool {
        self.reports
            .iter()
            .any(|r| r.outcome == crate::report::StageOutcome::Fail)
    }
}

/// Collect every task of the project. Per-item failures land in the
/// reports; only unrecoverable conditions (duplicate task ids, broken
/// configuration globs) error out of the whole stage.
pub fn collect_project(
    project: &Project,
    cfg: &Config,
    hooks: &HookRegistry,
    arena: &mut NodeArena,
) -> Result<CollectionOutcome> {
    let file_matcher = Glob::new(&cfg.task_file_pattern)
        .map_err(|e| TaskdagError::Configuration(format!("invalid task_file_pattern: {e}")))?
        .compile_matcher();
    let fn_matcher = Glob::new(&cfg.task_function_pattern)
        .map_err(|e| TaskdagError::Configuration(format!("invalid task_function_pattern: {e}")))?
        .compile_matcher();
    let ignore = build_ignore_set(&cfg.ignore_globs)?;
    let selector = Selector::from_config(cfg);
    let markers = known_markers(&cfg.markers);

    let mut tasks = Vec::new();
    let mut reports = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for module in &project.modules {
        if !under_roots(&cfg.roots, &module.path) {
            continue;
        }
        if ignore.is_match(&module.path) {
            debug!(module = %module.path.display(), "module ignored by glob");
            continue;
        }
        let file_name = module
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !file_matcher.is_match(&file_name) {
            continue;
        }
        let base_dir = module
            .path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .to_path_buf();

        for decl in &module.decls {
            if !(fn_matcher.is_match(&decl.name) || decl.marks.has("task")) {
                continue;
            }
            let started = Instant::now();
            let base_name = task_base_name(decl);
            let decl_id = task_id(&module.path, &base_name, None);

            if cfg.strict_markers {
                if let Some(unknown) = decl
                    .marks
                    .iter()
                    .map(|m| m.name.as_str())
                    .find(|name| !markers.contains_key(*name))
                {
                    reports.push(CollectionReport::fail(
                        decl_id,
                        started.elapsed().as_secs_f64(),
                        CapturedError::new(format!("unknown marker '{unknown}'")),
                    ));
                    continue;
                }
            }

            let expansions = match parametrize::expand(&decl.marks) {
                Ok(expansions) => expansions,
                Err(message) => {
                    reports.push(CollectionReport::fail(
                        decl_id,
                        started.elapsed().as_secs_f64(),
                        CapturedError::new(message),
                    ));
                    continue;
                }
            };

            for expansion in expansions {
                let id = task_id(&module.path, &base_name, expansion.suffix.as_deref());
                if !seen_ids.insert(id.clone()) {
                    return Err(TaskdagError::Collection(format!(
                        "duplicate task id '{id}'"
                    )));
                }

                match build_task(&module.path, &base_dir, decl, &base_name, id.clone(), expansion, hooks, arena)
                {
                    Ok(task) => {
                        if !selector.selects(&task) {
                            debug!(task = %id, "task deselected");
                            reports.push(CollectionReport::skip(id));
                            continue;
                        }
                        reports.push(CollectionReport::success(
                            id,
                            started.elapsed().as_secs_f64(),
                        ));
                        tasks.push(task);
                    }
                    Err(error) => {
                        reports.push(CollectionReport::fail(
                            id,
                            started.elapsed().as_secs_f64(),
                            error,
                        ));
                    }
                }
            }
        }
    }

    Ok(CollectionOutcome { tasks, reports })
}

fn build_ignore_set(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        builder.add(
            Glob::new(glob)
                .map_err(|e| TaskdagError::Configuration(format!("invalid ignore glob: {e}")))?,
        );
    }
    builder
        .build()
        .map_err(|e| TaskdagError::Configuration(format!("building ignore globs: {e}")))
}

fn under_roots(roots: &[PathBuf], module: &Path) -> bool {
    if roots.is_empty() {
        return true;
    }
    roots.iter().any(|root| module.starts_with(root))
}

/// A `task` mark with a `name` kwarg renames the collected task.
fn task_base_name(decl: &TaskDecl) -> String {
    decl.marks
        .get("task")
        .into_iter()
        .find_map(|m| m.kwarg("name").and_then(|v| v.as_str()).map(String::from))
        .unwrap_or_else(|| decl.name.clone())
}

fn task_id(module: &Path, name: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{}::{}[{}]", module.display(), name, suffix),
        None => format!("{}::{}", module.display(), name),
    }
}

/// Materialize one concrete task, dispatching `collect_task` first so a
/// custom listener can replace the built-in artifact interpretation.
#[allow(clippy::too_many_arguments)]
fn build_task(
    module: &Path,
    base_dir: &Path,
    decl: &TaskDecl,
    base_name: &str,
    id: String,
    expansion: Expansion,
    hooks: &HookRegistry,
    arena: &mut NodeArena,
) -> std::result::Result<Task, CapturedError> {
    let call = CollectTaskCall {
        module: module.to_path_buf(),
        name: base_name.to_string(),
        marks: decl.marks.clone(),
    };
    let blueprint = hooks
        .collect_task
        .call_first(&call)
        .map_err(|e| CapturedError::new(e.to_string()))?;

    let (dep_nodes, product_nodes) = match blueprint {
        Some(bp) => (bp.deps, bp.products),
        None => (
            collect_shape(&decl.marks, "depends_on", base_dir, hooks)?,
            collect_shape(&decl.marks, "produces", base_dir, hooks)?,
        ),
    };

    let deps = dep_nodes.map(|shape| shape.map_values(|node| arena.intern(node.clone())));
    let products = product_nodes.map(|shape| shape.map_values(|node| arena.intern(node.clone())));

    let try_first = decl.marks.has("try_first");
    let try_last = decl.marks.has("try_last");
    if try_first && try_last {
        return Err(CapturedError::new(
            "task carries both try_first and try_last",
        ));
    }

    let name = match &expansion.suffix {
        Some(suffix) => format!("{base_name}[{suffix}]"),
        None => base_name.to_string(),
    };

    Ok(Task {
        id,
        name,
        module: module.to_path_buf(),
        func: decl.func.clone(),
        deps,
        products,
        params: expansion.params,
        marks: decl.marks.clone(),
        try_first,
        try_last,
        digest: decl.digest.clone(),
    })
}

/// Interpret every positional argument of the named marks as a node
/// descriptor tree, preserving the declared single/sequence/mapping
/// shape.
fn collect_shape(
    marks: &MarkSet,
    mark_name: &str,
    base_dir: &Path,
    hooks: &HookRegistry,
) -> std::result::Result<Option<Shape<Node>>, CapturedError> {
    let descriptors: Vec<&MarkValue> = marks
        .get(mark_name)
        .into_iter()
        .flat_map(|m| m.args.iter())
        .collect();

    if descriptors.is_empty() {
        return Ok(None);
    }

    let shape = if descriptors.len() == 1 {
        shape_of(descriptors[0], base_dir, hooks)?
    } else if descriptors.iter().all(|d| matches!(d, MarkValue::Map(_))) {
        let mut merged = std::collections::BTreeMap::new();
        for descriptor in &descriptors {
            if let MarkValue::Map(entries) = descriptor {
                for (key, value) in entries {
                    let node = resolve_node(hooks, value, base_dir)?;
                    if merged.insert(key.clone(), node).is_some() {
                        return Err(CapturedError::new(format!(
                            "{mark_name} key '{key}' declared twice"
                        )));
                    }
                }
            }
        }
        Shape::Map(merged)
    } else if descriptors.iter().any(|d| matches!(d, MarkValue::Map(_))) {
        return Err(CapturedError::new(format!(
            "{mark_name} cannot mix mapping and positional descriptors"
        )));
    } else {
        let mut flat = Vec::new();
        for descriptor in &descriptors {
            match descriptor {
                MarkValue::Seq(items) => {
                    for item in items {
                        flat.push(resolve_node(hooks, item, base_dir)?);
                    }
                }
                other => flat.push(resolve_node(hooks, other, base_dir)?),
            }
        }
        Shape::Seq(flat)
    };

    Ok(Some(shape))
}

fn shape_of(
    descriptor: &MarkValue,
    base_dir: &Path,
    hooks: &HookRegistry,
) -> std::result::Result<Shape<Node>, CapturedError> {
    match descriptor {
        MarkValue::Seq(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for item in items {
                nodes.push(resolve_node(hooks, item, base_dir)?);
            }
            Ok(Shape::Seq(nodes))
        }
        MarkValue::Map(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), resolve_node(hooks, value, base_dir)?);
            }
            Ok(Shape::Map(map))
        }
        other => Ok(Shape::Single(resolve_node(hooks, other, base_dir)?)),
    }
}

fn resolve_node(
    hooks: &HookRegistry,
    descriptor: &MarkValue,
    base_dir: &Path,
) -> std::result::Result<Node, CapturedError> {
    let call = CollectNodeCall {
        descriptor: descriptor.clone(),
        base_dir: base_dir.to_path_buf(),
    };
    match hooks.collect_node.call_first(&call) {
        Ok(Some(node)) => Ok(node),
        Ok(None) => {
            let mut rendered = String::new();
            descriptor.render(&mut rendered);
            Err(CapturedError::new(
                TaskdagError::NodeNotCollected(rendered).to_string(),
            ))
        }
        Err(e) => Err(CapturedError::new(e.to_string())),
    }
}
