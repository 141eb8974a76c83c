//! Property tests for the resolver over randomly generated DAGs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use proptest::prelude::*;

use taskdag::dag::resolve;
use taskdag::fs::mock::MockFileSystem;
use taskdag::marks::MarkSet;
use taskdag::nodes::{Node, NodeArena};
use taskdag::task::{Shape, Task};
use taskdag::TaskSignal;

/// Build a task list where task `i` may only depend on products of tasks
/// `0..i`, which keeps every generated graph acyclic.
fn build_dag(raw_deps: Vec<Vec<usize>>) -> (Vec<Task>, NodeArena) {
    let n = raw_deps.len();
    let mut arena = NodeArena::new();
    let outputs: Vec<usize> = (0..n)
        .map(|i| arena.intern(Node::path(format!("/out/{i}.txt"))))
        .collect();

    let tasks = raw_deps
        .into_iter()
        .enumerate()
        .map(|(i, potential)| {
            let mut deps: Vec<usize> = potential
                .into_iter()
                .filter_map(|d| if i > 0 { Some(outputs[d % i]) } else { None })
                .collect();
            deps.sort_unstable();
            deps.dedup();

            Task {
                id: format!("m::task_{i:03}"),
                name: format!("task_{i:03}"),
                module: PathBuf::from("m"),
                func: Arc::new(|_| Ok(TaskSignal::Done)),
                deps: if deps.is_empty() {
                    None
                } else {
                    Some(Shape::Seq(deps))
                },
                products: Some(Shape::Single(outputs[i])),
                params: BTreeMap::new(),
                marks: MarkSet::new(),
                try_first: false,
                try_last: false,
                digest: None,
            }
        })
        .collect();

    (tasks, arena)
}

proptest! {
    #[test]
    fn resolver_orders_random_dags_topologically(
        raw_deps in proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..8),
            1..16,
        )
    ) {
        let (tasks, arena) = build_dag(raw_deps);
        let fs = MockFileSystem::new();

        let resolved = resolve(&tasks, &arena, &fs).unwrap();
        prop_assert_eq!(resolved.order.len(), tasks.len());

        let mut position = vec![0usize; tasks.len()];
        for (pos, &t) in resolved.order.iter().enumerate() {
            position[t] = pos;
        }

        for t in 0..tasks.len() {
            for &pred in resolved.graph.preds_of(t) {
                prop_assert!(
                    position[pred] < position[t],
                    "task {} ordered before its predecessor {}",
                    t,
                    pred
                );
                prop_assert!(resolved.waves[pred] < resolved.waves[t]);
            }
        }
    }

    #[test]
    fn resolution_is_deterministic(
        raw_deps in proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..6),
            1..12,
        )
    ) {
        let (tasks_a, arena_a) = build_dag(raw_deps.clone());
        let (tasks_b, arena_b) = build_dag(raw_deps);
        let fs = MockFileSystem::new();

        let first = resolve(&tasks_a, &arena_a, &fs).unwrap();
        let second = resolve(&tasks_b, &arena_b, &fs).unwrap();
        prop_assert_eq!(first.order, second.order);
        prop_assert_eq!(first.waves, second.waves);
    }
}
