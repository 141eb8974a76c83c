// src/exec/mod.rs

pub mod backend;
pub mod context;
pub mod engine;
pub mod fingerprint;

pub use backend::{BlockingExecutor, ExecEvent, ExecutorBackend, PreparedTask};
pub use context::{ResolvedNode, TaskContext};
pub use engine::{ExecutionEngine, ExecutionOptions, ExecutionOutcome};

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::hooks::{TaskCallResult, TaskExecuteCall};
use crate::report::CapturedError;

/// Invoke a task callable, translating panics and errors into the
/// captured-error channel. This is the default `task_execute` listener.
pub(crate) fn invoke_callable(call: &TaskExecuteCall) -> TaskCallResult {
    match catch_unwind(AssertUnwindSafe(|| (call.func)(&call.ctx))) {
        Ok(Ok(signal)) => Ok(signal),
        Ok(Err(error)) => Err(CapturedError::from_error(&error)),
        Err(panic) => Err(CapturedError::new(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}
