// src/dag/graph.rs

use std::collections::HashMap;

/// Bipartite adjacency over tasks and nodes.
///
/// Vertices are arena indices (tasks by collection order, nodes by intern
/// order). Edges run Node -> Task for dependencies and Task -> Node for
/// products; the induced task-only projection is kept alongside for
/// scheduling. All references are plain indices, so the structure is
/// freely shareable read-only during execution.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    producer_of: HashMap<usize, usize>,
    consumers_of: HashMap<usize, Vec<usize>>,
    task_deps: Vec<Vec<usize>>,
    task_products: Vec<Vec<usize>>,
    task_preds: Vec<Vec<usize>>,
    task_succs: Vec<Vec<usize>>,
}

impl BuildGraph {
    pub fn new(n_tasks: usize) -> Self {
        Self {
            producer_of: HashMap::new(),
            consumers_of: HashMap::new(),
            task_deps: vec![Vec::new(); n_tasks],
            task_products: vec![Vec::new(); n_tasks],
            task_preds: vec![Vec::new(); n_tasks],
            task_succs: vec![Vec::new(); n_tasks],
        }
    }

    pub fn n_tasks(&self) -> usize {
        self.task_deps.len()
    }

    /// Register `task` as the producer of `node`. Returns the previous
    /// producer if the node already had one.
    pub(crate) fn set_producer(&mut self, node: usize, task: usize) -> Option<usize> {
        if let Some(prev) = self.producer_of.get(&node).copied() {
            return Some(prev);
        }
        self.producer_of.insert(node, task);
        None
    }

    pub(crate) fn add_product(&mut self, task: usize, node: usize) {
        self.task_products[task].push(node);
    }

    pub(crate) fn add_dep(&mut self, task: usize, node: usize) {
        self.task_deps[task].push(node);
        self.consumers_of.entry(node).or_default().push(task);
    }

    /// Derive the task-only projection from producer/consumer edges.
    pub(crate) fn link_projection(&mut self) {
        for task in 0..self.task_deps.len() {
            let mut preds: Vec<usize> = self.task_deps[task]
                .iter()
                .filter_map(|node| self.producer_of.get(node).copied())
                .collect();
            preds.sort_unstable();
            preds.dedup();
            for &pred in &preds {
                self.task_succs[pred].push(task);
            }
            self.task_preds[task] = preds;
        }
    }

    pub fn producer_of(&self, node: usize) -> Option<usize> {
        self.producer_of.get(&node).copied()
    }

    pub fn consumers_of(&self, node: usize) -> &[usize] {
        self.consumers_of
            .get(&node)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn deps_of(&self, task: usize) -> &[usize] {
        &self.task_deps[task]
    }

    pub fn products_of(&self, task: usize) -> &[usize] {
        &self.task_products[task]
    }

    /// Tasks producing at least one dependency of `task`.
    pub fn preds_of(&self, task: usize) -> &[usize] {
        &self.task_preds[task]
    }

    /// Tasks consuming at least one product of `task`.
    pub fn succs_of(&self, task: usize) -> &[usize] {
        &self.task_succs[task]
    }
}
