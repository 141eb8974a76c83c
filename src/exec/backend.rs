// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The engine talks to an [`ExecutorBackend`] instead of spawning
//! directly. Production uses [`BlockingExecutor`], which runs each
//! callable on the blocking thread pool and reports completion over an
//! mpsc channel; tests can provide a backend that fabricates completions
//! without ever running a callable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::Result;
use crate::hooks::{HookRegistry, TaskCallResult, TaskExecuteCall};
use crate::report::CapturedError;

/// A task the engine decided to run, addressed by its index in the
/// collected task list.
#[derive(Clone)]
pub struct PreparedTask {
    pub index: usize,
    pub call: TaskExecuteCall,
}

/// Completion event flowing back to the engine loop.
#[derive(Debug)]
pub struct ExecEvent {
    pub task: usize,
    pub started_at: DateTime<Utc>,
    pub duration_s: f64,
    pub result: TaskCallResult,
}

/// Trait abstracting how prepared tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks. Completion must eventually surface as an
    /// [`ExecEvent`] on the channel the backend was built with.
    fn spawn_ready(
        &mut self,
        tasks: Vec<PreparedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: one `spawn_blocking` call per task, dispatching
/// through the `task_execute` hook so wrappers see every invocation.
pub struct BlockingExecutor {
    tx: mpsc::Sender<ExecEvent>,
    hooks: Arc<HookRegistry>,
}

impl BlockingExecutor {
    pub fn new(tx: mpsc::Sender<ExecEvent>, hooks: Arc<HookRegistry>) -> Self {
        Self { tx, hooks }
    }
}

impl ExecutorBackend for BlockingExecutor {
    fn spawn_ready(
        &mut self,
        tasks: Vec<PreparedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        let hooks = Arc::clone(&self.hooks);

        Box::pin(async move {
            for prepared in tasks {
                let tx = tx.clone();
                let hooks = Arc::clone(&hooks);
                debug!(task = %prepared.call.task_id, "dispatching task to blocking pool");

                tokio::task::spawn_blocking(move || {
                    let started_at = Utc::now();
                    let timer = Instant::now();

                    let result = match hooks.task_execute.call_first(&prepared.call) {
                        Ok(Some(result)) => result,
                        Ok(None) => Err(CapturedError::new(
                            "no task_execute listener handled the call",
                        )),
                        Err(hook_error) => Err(CapturedError::new(hook_error.to_string())),
                    };

                    let _ = tx.blocking_send(ExecEvent {
                        task: prepared.index,
                        started_at,
                        duration_s: timer.elapsed().as_secs_f64(),
                        result,
                    });
                });
            }
            Ok(())
        })
    }
}
