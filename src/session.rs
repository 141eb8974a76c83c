// src/session.rs

//! One configured pipeline: collection -> resolution -> execution ->
//! reporting, plus the maintenance operations behind the subcommands.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::info;

use crate::collect::collect_project;
use crate::config::{validate::validate, Config};
use crate::dag::resolve;
use crate::errors::{Result, TaskdagError};
use crate::exec::{BlockingExecutor, ExecutionEngine, ExecutionOptions};
use crate::fs::{FileSystem, RealFileSystem};
use crate::hooks::{known_markers, HookRegistry};
use crate::nodes::NodeArena;
use crate::report::{
    CapturedError, CollectionReport, ResolutionReport, RunReport, StageOutcome,
};
use crate::state::{FileStateStore, StateStore};
use crate::task::Project;
use crate::types::TaskId;

pub struct Session {
    project: Project,
    config: Config,
    fs: Arc<dyn FileSystem>,
    hooks: Arc<HookRegistry>,
    state: Mutex<Box<dyn StateStore>>,
}

impl Session {
    /// Production session: real filesystem, file-backed state database.
    pub fn new(project: Project, config: Config) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let state: Box<dyn StateStore> =
            Box::new(FileStateStore::open(Arc::clone(&fs), config.state_path.clone()));
        Self::with_parts(project, config, fs, state)
    }

    /// Session over explicit filesystem and state implementations; tests
    /// run fully in memory this way.
    pub fn with_parts(
        project: Project,
        config: Config,
        fs: Arc<dyn FileSystem>,
        state: Box<dyn StateStore>,
    ) -> Result<Self> {
        validate(&config)?;
        let hooks = Arc::new(HookRegistry::new(
            Arc::clone(&fs),
            config.small_file_threshold,
        ));
        Ok(Self {
            project,
            config,
            fs,
            hooks,
            state: Mutex::new(state),
        })
    }

    /// Customize hook listeners. Only possible while no run is active.
    pub fn configure_hooks(&mut self, f: impl FnOnce(&mut HookRegistry)) -> Result<()> {
        match Arc::get_mut(&mut self.hooks) {
            Some(hooks) => {
                f(hooks);
                Ok(())
            }
            None => Err(TaskdagError::Execution(
                "hook registry is frozen while a run is active".to_string(),
            )),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The full pipeline. Stage failures fold into the report and its
    /// exit code rather than erroring out.
    pub async fn build(&self) -> RunReport {
        let mut arena = NodeArena::new();
        let collected =
            match collect_project(&self.project, &self.config, &self.hooks, &mut arena) {
                Ok(outcome) => outcome,
                Err(error) => {
                    let report = CollectionReport::fail(
                        "collection",
                        0.0,
                        CapturedError::new(error.to_string()),
                    );
                    let run = RunReport::assemble(vec![report], None, vec![], false);
                    run.log_summary();
                    return run;
                }
            };

        if collected.has_failures() {
            let run = RunReport::assemble(collected.reports, None, vec![], false);
            run.log_summary();
            return run;
        }

        let res_started = Instant::now();
        let resolved = match resolve(&collected.tasks, &arena, self.fs.as_ref()) {
            Ok(resolved) => resolved,
            Err(error) => {
                let resolution = ResolutionReport {
                    outcome: StageOutcome::Fail,
                    n_tasks: collected.tasks.len(),
                    n_nodes: arena.len(),
                    duration_s: res_started.elapsed().as_secs_f64(),
                    error: Some(CapturedError::new(error.to_string())),
                };
                let run = RunReport::assemble(collected.reports, Some(resolution), vec![], false);
                run.log_summary();
                return run;
            }
        };
        let resolution = ResolutionReport {
            outcome: StageOutcome::Success,
            n_tasks: collected.tasks.len(),
            n_nodes: arena.len(),
            duration_s: res_started.elapsed().as_secs_f64(),
            error: None,
        };

        let options = ExecutionOptions {
            workers: self.config.workers,
            max_failures: self.config.max_failures,
        };
        let (tx, rx) = mpsc::channel(64);
        let backend = BlockingExecutor::new(tx, Arc::clone(&self.hooks));
        let engine = ExecutionEngine::new(
            &collected.tasks,
            &resolved,
            &arena,
            &self.hooks,
            &self.state,
            options,
        );
        let outcome = engine.run(backend, rx).await;

        let run = RunReport::assemble(
            collected.reports,
            Some(resolution),
            outcome.reports,
            outcome.aborted,
        );
        run.log_summary();
        run
    }

    /// Collection and resolution only; returns the collected task ids.
    pub fn collect_only(&self) -> (RunReport, Vec<TaskId>) {
        let mut arena = NodeArena::new();
        let collected =
            match collect_project(&self.project, &self.config, &self.hooks, &mut arena) {
                Ok(outcome) => outcome,
                Err(error) => {
                    let report = CollectionReport::fail(
                        "collection",
                        0.0,
                        CapturedError::new(error.to_string()),
                    );
                    return (
                        RunReport::assemble(vec![report], None, vec![], false),
                        vec![],
                    );
                }
            };

        let ids: Vec<TaskId> = collected.tasks.iter().map(|t| t.id.clone()).collect();
        if collected.has_failures() {
            return (
                RunReport::assemble(collected.reports, None, vec![], false),
                ids,
            );
        }

        let res_started = Instant::now();
        let resolution = match resolve(&collected.tasks, &arena, self.fs.as_ref()) {
            Ok(_) => ResolutionReport {
                outcome: StageOutcome::Success,
                n_tasks: collected.tasks.len(),
                n_nodes: arena.len(),
                duration_s: res_started.elapsed().as_secs_f64(),
                error: None,
            },
            Err(error) => ResolutionReport {
                outcome: StageOutcome::Fail,
                n_tasks: collected.tasks.len(),
                n_nodes: arena.len(),
                duration_s: res_started.elapsed().as_secs_f64(),
                error: Some(CapturedError::new(error.to_string())),
            },
        };

        (
            RunReport::assemble(collected.reports, Some(resolution), vec![], false),
            ids,
        )
    }

    /// Drop state records of tasks that no longer collect, then compact.
    pub fn clean(&self) -> Result<Vec<TaskId>> {
        let mut arena = NodeArena::new();
        let collected = collect_project(&self.project, &self.config, &self.hooks, &mut arena)?;
        let live: HashSet<&TaskId> = collected.tasks.iter().map(|t| &t.id).collect();

        let mut state = self.state.lock().unwrap();
        let mut dropped = Vec::new();
        for id in state.task_ids() {
            if !live.contains(&id) {
                state.drop_task(&id)?;
                dropped.push(id);
            }
        }
        state.compact()?;
        info!(dropped = dropped.len(), "state database cleaned");
        Ok(dropped)
    }

    /// Known markers with descriptions, reserved set first.
    pub fn markers(&self) -> Vec<(String, String)> {
        known_markers(&self.config.markers).into_iter().collect()
    }

    /// Plain-text rendering of the resolved DAG, grouped by wave.
    pub fn dag_text(&self) -> Result<String> {
        let mut arena = NodeArena::new();
        let collected = collect_project(&self.project, &self.config, &self.hooks, &mut arena)?;
        if collected.has_failures() {
            return Err(TaskdagError::Collection(
                "cannot render the DAG: collection failed".to_string(),
            ));
        }
        let resolved = resolve(&collected.tasks, &arena, self.fs.as_ref())?;

        if resolved.order.is_empty() {
            return Ok("(no tasks collected)\n".to_string());
        }

        let mut out = String::new();
        let max_wave = resolved.waves.iter().copied().max().unwrap_or(0);
        for wave in 0..=max_wave {
            out.push_str(&format!("wave {wave}:\n"));
            for &t in &resolved.order {
                if resolved.waves[t] != wave {
                    continue;
                }
                let task = &collected.tasks[t];
                out.push_str(&format!("  {}\n", task.id));
                for node in task.dep_indices() {
                    out.push_str(&format!("    <- {}\n", arena.id_of(node)));
                }
                for node in task.product_indices() {
                    out.push_str(&format!("    -> {}\n", arena.id_of(node)));
                }
            }
        }
        Ok(out)
    }

    /// Last recorded durations from task metadata, slowest first.
    pub fn profile(&self) -> Vec<(TaskId, f64)> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<(TaskId, f64)> = state
            .task_ids()
            .into_iter()
            .filter_map(|id| {
                state
                    .task_meta(&id)
                    .map(|meta| (id, meta.last_duration_s))
            })
            .collect();
        rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rows
    }
}
