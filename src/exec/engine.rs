// src/exec/engine.rs

//! Incremental execution engine.
//!
//! Drives the resolved DAG with up to `workers` tasks in flight. The
//! per-task protocol: skip marks, ancestor propagation, fingerprint
//! comparison against the state database, execution through the
//! `task_execute` hook, product post-check, transactional commit.
//!
//! The engine loop is the single writer of scheduling state; the graph
//! and arena stay read-only throughout. Cancellation is cooperative: an
//! `Exit` signal stops further dispatching while running tasks drain.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::resolver::{ReadyKey, ResolvedDag};
use crate::errors::TaskdagError;
use crate::hooks::{HookRegistry, NodeFingerprintCall, TaskCallResult, TaskExecuteCall};
use crate::nodes::{Fingerprint, NodeArena};
use crate::report::{CapturedError, ExecutionReport};
use crate::state::{Role, StateStore, TaskMeta};
use crate::task::Task;
use crate::types::{Outcome, TaskSignal};

use super::backend::{ExecEvent, ExecutorBackend, PreparedTask};
use super::context::TaskContext;
use super::fingerprint::task_hash;

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub workers: usize,
    pub max_failures: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            max_failures: None,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub reports: Vec<ExecutionReport>,
    pub aborted: bool,
}

/// What the pre-check decided for a ready task.
enum PreDecision {
    /// Terminal without running the callable.
    Terminal(Outcome, Option<CapturedError>),
    /// `persist` mark applies: record current fingerprints, don't run.
    Persist,
    Run(TaskContext),
}

pub struct ExecutionEngine<'a> {
    tasks: &'a [Task],
    dag: &'a ResolvedDag,
    arena: &'a NodeArena,
    hooks: &'a HookRegistry,
    state: &'a Mutex<Box<dyn StateStore>>,
    options: ExecutionOptions,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        tasks: &'a [Task],
        dag: &'a ResolvedDag,
        arena: &'a NodeArena,
        hooks: &'a HookRegistry,
        state: &'a Mutex<Box<dyn StateStore>>,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            tasks,
            dag,
            arena,
            hooks,
            state,
            options,
        }
    }

    /// Run the whole plan to quiescence.
    pub async fn run<B: ExecutorBackend>(
        &self,
        mut backend: B,
        mut rx: mpsc::Receiver<ExecEvent>,
    ) -> ExecutionOutcome {
        let n = self.tasks.len();
        let mut pending: Vec<usize> = (0..n).map(|t| self.dag.graph.preds_of(t).len()).collect();
        let mut outcomes: Vec<Option<Outcome>> = vec![None; n];
        let mut reports: Vec<ExecutionReport> = Vec::new();
        let mut ready: BinaryHeap<Reverse<ReadyKey>> = self
            .dag
            .order
            .iter()
            .copied()
            .filter(|&t| pending[t] == 0)
            .map(|t| ReadyKey::for_task(&self.tasks[t], t))
            .collect();

        let mut in_flight = 0usize;
        let mut failures = 0usize;
        let mut stop = false;
        let mut aborted = false;

        loop {
            while !stop && in_flight < self.options.workers {
                let Some(Reverse(key)) = ready.pop() else { break };
                let t = key.index;

                match self.pre_decide(t, &outcomes) {
                    PreDecision::Terminal(outcome, error) => {
                        let report = ExecutionReport {
                            task_id: self.tasks[t].id.clone(),
                            outcome,
                            started_at: Utc::now(),
                            duration_s: 0.0,
                            error,
                        };
                        self.complete(
                            t, report, &mut outcomes, &mut pending, &mut ready, &mut reports,
                            &mut failures, &mut stop,
                        );
                    }
                    PreDecision::Persist => {
                        let (outcome, error) = match self.commit(&self.tasks[t], Outcome::Persisted, 0.0)
                        {
                            Ok(()) => (Outcome::Persisted, None),
                            Err(e) => (
                                Outcome::Fail,
                                Some(CapturedError::new(format!("state commit failed: {e}"))),
                            ),
                        };
                        let report = ExecutionReport {
                            task_id: self.tasks[t].id.clone(),
                            outcome,
                            started_at: Utc::now(),
                            duration_s: 0.0,
                            error,
                        };
                        self.complete(
                            t, report, &mut outcomes, &mut pending, &mut ready, &mut reports,
                            &mut failures, &mut stop,
                        );
                    }
                    PreDecision::Run(ctx) => {
                        let call = TaskExecuteCall {
                            task_id: self.tasks[t].id.clone(),
                            func: self.tasks[t].func.clone(),
                            ctx,
                        };
                        match backend.spawn_ready(vec![PreparedTask { index: t, call }]).await {
                            Ok(()) => in_flight += 1,
                            Err(error) => {
                                let report = ExecutionReport {
                                    task_id: self.tasks[t].id.clone(),
                                    outcome: Outcome::Fail,
                                    started_at: Utc::now(),
                                    duration_s: 0.0,
                                    error: Some(CapturedError::new(format!(
                                        "dispatch failed: {error}"
                                    ))),
                                };
                                self.complete(
                                    t, report, &mut outcomes, &mut pending, &mut ready,
                                    &mut reports, &mut failures, &mut stop,
                                );
                            }
                        }
                    }
                }
            }

            if in_flight == 0 {
                break;
            }

            let Some(event) = rx.recv().await else {
                warn!("executor channel closed with tasks in flight");
                break;
            };
            in_flight -= 1;

            let t = event.task;
            let (outcome, error, exit) = self.post_process(t, event.result, event.duration_s);
            if exit {
                aborted = true;
                stop = true;
                info!(task = %self.tasks[t].id, "exit requested; draining running tasks");
            }
            let report = ExecutionReport {
                task_id: self.tasks[t].id.clone(),
                outcome,
                started_at: event.started_at,
                duration_s: event.duration_s,
                error,
            };
            self.complete(
                t, report, &mut outcomes, &mut pending, &mut ready, &mut reports, &mut failures,
                &mut stop,
            );
        }

        ExecutionOutcome { reports, aborted }
    }

    /// Skip marks, ancestor propagation, then the up-to-date check.
    fn pre_decide(&self, t: usize, outcomes: &[Option<Outcome>]) -> PreDecision {
        let task = &self.tasks[t];

        for mark in task.marks.get_all() {
            match mark.name.as_str() {
                "skip" => return PreDecision::Terminal(Outcome::Skip, None),
                "skip_if" => {
                    if mark.first_arg().and_then(|v| v.as_bool()).unwrap_or(false) {
                        let reason = mark
                            .kwarg("reason")
                            .and_then(|v| v.as_str())
                            .unwrap_or("skip_if condition held");
                        debug!(task = %task.id, reason, "skipping task");
                        return PreDecision::Terminal(Outcome::Skip, None);
                    }
                }
                _ => {}
            }
        }

        let failed_pred = self
            .dag
            .graph
            .preds_of(t)
            .iter()
            .find(|&&p| outcomes[p].is_some_and(|o| !o.is_passing()));
        if let Some(&pred) = failed_pred {
            let error = CapturedError::new(format!(
                "predecessor '{}' did not succeed",
                self.tasks[pred].id
            ));
            return PreDecision::Terminal(Outcome::SkipAncestorFailed, Some(error));
        }

        let hash = task_hash(task);
        if self.up_to_date(task, &hash) {
            return PreDecision::Terminal(Outcome::SkipUnchanged, None);
        }

        if task.marks.has("persist") && self.deps_unchanged(task, &hash) {
            debug!(task = %task.id, "persist mark applies; recording fingerprints without running");
            return PreDecision::Persist;
        }

        PreDecision::Run(TaskContext::new(task, self.arena))
    }

    /// Translate the callable's result into an outcome, running the
    /// product post-check and the state commit.
    fn post_process(
        &self,
        t: usize,
        result: TaskCallResult,
        duration_s: f64,
    ) -> (Outcome, Option<CapturedError>, bool) {
        let task = &self.tasks[t];
        match result {
            Ok(TaskSignal::Done) => {
                for node in task.product_indices() {
                    if self.fingerprint(node).is_absent() {
                        let error = CapturedError::new(
                            TaskdagError::NodeNotFound(format!(
                                "product '{}' of task '{}' was not produced",
                                self.arena.id_of(node),
                                task.id
                            ))
                            .to_string(),
                        );
                        return (Outcome::Fail, Some(error), false);
                    }
                }
                match self.commit(task, Outcome::Success, duration_s) {
                    Ok(()) => (Outcome::Success, None, false),
                    Err(e) => (
                        Outcome::Fail,
                        Some(CapturedError::new(format!("state commit failed: {e}"))),
                        false,
                    ),
                }
            }
            Ok(TaskSignal::Skipped { reason }) => {
                debug!(task = %task.id, reason, "task skipped itself");
                (Outcome::Skip, None, false)
            }
            Ok(TaskSignal::Persisted) => match self.commit(task, Outcome::Persisted, duration_s) {
                Ok(()) => (Outcome::Persisted, None, false),
                Err(e) => (
                    Outcome::Fail,
                    Some(CapturedError::new(format!("state commit failed: {e}"))),
                    false,
                ),
            },
            Ok(TaskSignal::Exit) => (Outcome::Skip, None, true),
            Err(error) => (Outcome::Fail, Some(error), false),
        }
    }

    /// Record a terminal outcome, notify observers, and release newly
    /// ready dependents.
    #[allow(clippy::too_many_arguments)]
    fn complete(
        &self,
        t: usize,
        report: ExecutionReport,
        outcomes: &mut [Option<Outcome>],
        pending: &mut [usize],
        ready: &mut BinaryHeap<Reverse<ReadyKey>>,
        reports: &mut Vec<ExecutionReport>,
        failures: &mut usize,
        stop: &mut bool,
    ) {
        let outcome = report.outcome;
        outcomes[t] = Some(outcome);

        match outcome {
            Outcome::Fail => warn!(
                task = %report.task_id,
                error = report.error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
                "task failed"
            ),
            _ => debug!(task = %report.task_id, ?outcome, "task finished"),
        }

        let observers = self.hooks.report_task.call_all(&report);
        for error in observers.errors {
            warn!(%error, "report_task listener failed");
        }
        reports.push(report);

        if outcome == Outcome::Fail {
            *failures += 1;
            if let Some(max) = self.options.max_failures {
                if *failures >= max && !*stop {
                    warn!(
                        failures = *failures,
                        "failure threshold reached; not scheduling further tasks"
                    );
                    *stop = true;
                }
            }
        }

        for &succ in self.dag.graph.succs_of(t) {
            pending[succ] -= 1;
            if pending[succ] == 0 {
                ready.push(ReadyKey::for_task(&self.tasks[succ], succ));
            }
        }
    }

    fn fingerprint(&self, node: usize) -> Fingerprint {
        let call = NodeFingerprintCall {
            node: self.arena.get(node).clone(),
        };
        match self.hooks.node_fingerprint.call_first(&call) {
            Ok(Some(fp)) => fp,
            Ok(None) => {
                warn!(node = %self.arena.id_of(node), "no fingerprint listener; treating node as absent");
                Fingerprint::Absent
            }
            Err(error) => {
                warn!(%error, "fingerprint listener failed; treating node as absent");
                Fingerprint::Absent
            }
        }
    }

    /// Up-to-date iff every dependency and product fingerprint matches
    /// the stored one, every product exists, and the task hash matches.
    fn up_to_date(&self, task: &Task, hash: &str) -> bool {
        let state = self.state.lock().unwrap();
        let Some(meta) = state.task_meta(&task.id) else {
            return false;
        };
        if meta.task_hash != hash {
            return false;
        }

        for (role, nodes) in [
            (Role::Dep, task.dep_indices()),
            (Role::Prod, task.product_indices()),
        ] {
            for node in nodes {
                let current = self.fingerprint(node);
                if current.is_absent() {
                    return false;
                }
                let Some(stored) = state.get(&task.id, &self.arena.id_of(node), role) else {
                    return false;
                };
                if stored.fingerprint != current || stored.task_hash != hash {
                    return false;
                }
            }
        }
        true
    }

    /// The `persist` precondition: the callable and its inputs are
    /// unchanged, only products drifted.
    fn deps_unchanged(&self, task: &Task, hash: &str) -> bool {
        let state = self.state.lock().unwrap();
        let Some(meta) = state.task_meta(&task.id) else {
            return false;
        };
        if meta.task_hash != hash {
            return false;
        }
        for node in task.dep_indices() {
            let current = self.fingerprint(node);
            if current.is_absent() {
                return false;
            }
            let Some(stored) = state.get(&task.id, &self.arena.id_of(node), Role::Dep) else {
                return false;
            };
            if stored.fingerprint != current || stored.task_hash != hash {
                return false;
            }
        }
        true
    }

    /// Transactional upsert of current fingerprints and metadata.
    fn commit(&self, task: &Task, outcome: Outcome, duration_s: f64) -> crate::errors::Result<()> {
        let hash = task_hash(task);
        let mut records = Vec::new();
        for node in task.dep_indices() {
            records.push((self.arena.id_of(node), Role::Dep, self.fingerprint(node)));
        }
        for node in task.product_indices() {
            records.push((self.arena.id_of(node), Role::Prod, self.fingerprint(node)));
        }
        let meta = TaskMeta {
            task_hash: hash,
            last_outcome: outcome,
            last_duration_s: duration_s,
        };
        let mut state = self.state.lock().unwrap();
        state.put(&task.id, meta, records)
    }
}
