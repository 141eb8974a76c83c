// src/dag/resolver.rs

//! DAG resolution: link tasks to their artifact nodes, validate
//! well-formedness, and produce a deterministic execution order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph::BuildGraph;
use crate::errors::{Result, TaskdagError};
use crate::fs::FileSystem;
use crate::nodes::NodeArena;
use crate::task::Task;

/// Output of resolution: the graph, a topological task order, and a wave
/// index per task (wave = longest predecessor chain).
#[derive(Debug)]
pub struct ResolvedDag {
    pub graph: BuildGraph,
    pub order: Vec<usize>,
    pub waves: Vec<u32>,
}

/// Ordering key for equally-ready tasks: `try_first` before unmarked
/// before `try_last`, then lexicographic by task id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ReadyKey {
    bucket: u8,
    id: String,
    pub(crate) index: usize,
}

impl ReadyKey {
    pub(crate) fn for_task(task: &Task, index: usize) -> Reverse<ReadyKey> {
        let bucket = if task.try_first {
            0
        } else if task.try_last {
            2
        } else {
            1
        };
        Reverse(ReadyKey {
            bucket,
            id: task.id.clone(),
            index,
        })
    }
}

/// Build and validate the graph, then order it with Kahn's algorithm.
pub fn resolve(tasks: &[Task], arena: &NodeArena, fs: &dyn FileSystem) -> Result<ResolvedDag> {
    let n = tasks.len();
    let mut graph = BuildGraph::new(n);

    // Products first, so duplicate producers surface before anything else.
    for (t, task) in tasks.iter().enumerate() {
        for node in task.product_indices() {
            if let Some(prev) = graph.set_producer(node, t) {
                return Err(TaskdagError::ResolvingDependencies(format!(
                    "product '{}' produced by both '{}' and '{}'",
                    arena.id_of(node),
                    tasks[prev].id,
                    task.id
                )));
            }
            graph.add_product(t, node);
        }
    }

    for (t, task) in tasks.iter().enumerate() {
        let products: HashSet<usize> = task.product_indices().into_iter().collect();
        for node in task.dep_indices() {
            if products.contains(&node) {
                return Err(TaskdagError::ResolvingDependencies(format!(
                    "task '{}' declares '{}' as both dependency and product",
                    task.id,
                    arena.id_of(node)
                )));
            }
            // A dependency nobody produces must already exist on disk to
            // count as a pre-existing input.
            if graph.producer_of(node).is_none() && !arena.get(node).exists(fs) {
                return Err(TaskdagError::ResolvingDependencies(format!(
                    "missing input '{}' required by '{}'",
                    arena.id_of(node),
                    task.id
                )));
            }
            graph.add_dep(t, node);
        }
    }

    graph.link_projection();
    detect_cycles(tasks, &graph)?;

    // Kahn's algorithm over the task projection, tie-broken by ReadyKey.
    let mut indegree: Vec<usize> = (0..n).map(|t| graph.preds_of(t).len()).collect();
    let mut heap: BinaryHeap<Reverse<ReadyKey>> = (0..n)
        .filter(|&t| indegree[t] == 0)
        .map(|t| ReadyKey::for_task(&tasks[t], t))
        .collect();

    let mut order = Vec::with_capacity(n);
    let mut waves = vec![0u32; n];
    while let Some(Reverse(key)) = heap.pop() {
        let t = key.index;
        order.push(t);
        for &succ in graph.succs_of(t) {
            waves[succ] = waves[succ].max(waves[t] + 1);
            indegree[succ] -= 1;
            if indegree[succ] == 0 {
                heap.push(ReadyKey::for_task(&tasks[succ], succ));
            }
        }
    }
    debug_assert_eq!(order.len(), n, "cycle detection missed a cycle");

    debug!(
        tasks = n,
        nodes = arena.len(),
        waves = waves.iter().max().map(|w| w + 1).unwrap_or(0),
        "resolution complete"
    );

    Ok(ResolvedDag {
        graph,
        order,
        waves,
    })
}

fn detect_cycles(tasks: &[Task], graph: &BuildGraph) -> Result<()> {
    let mut projection: DiGraphMap<usize, ()> = DiGraphMap::new();
    for t in 0..tasks.len() {
        projection.add_node(t);
    }
    for t in 0..tasks.len() {
        for &pred in graph.preds_of(t) {
            projection.add_edge(pred, t, ());
        }
    }

    for scc in tarjan_scc(&projection) {
        if scc.len() > 1 {
            let mut names: Vec<_> = scc.iter().map(|&t| tasks[t].id.clone()).collect();
            names.sort();
            return Err(TaskdagError::ResolvingDependencies(format!(
                "cycle detected among tasks: {}",
                names.join(", ")
            )));
        }
    }
    Ok(())
}
