use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use taskdag::errors::Result;
use taskdag::exec::{ExecEvent, ExecutorBackend, PreparedTask};
use taskdag::TaskSignal;

/// A fake executor that:
/// - records which tasks were dispatched
/// - immediately reports completion without running any callable.
///
/// Tasks listed in `failing` complete with a captured error instead.
pub struct FakeExecutor {
    tx: mpsc::Sender<ExecEvent>,
    dispatched: Arc<Mutex<Vec<String>>>,
    failing: Vec<String>,
}

impl FakeExecutor {
    pub fn new(tx: mpsc::Sender<ExecEvent>, dispatched: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            tx,
            dispatched,
            failing: Vec::new(),
        }
    }

    pub fn with_failing(mut self, task_ids: Vec<String>) -> Self {
        self.failing = task_ids;
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready(
        &mut self,
        tasks: Vec<PreparedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        let dispatched = Arc::clone(&self.dispatched);
        let failing = self.failing.clone();

        Box::pin(async move {
            for task in tasks {
                dispatched.lock().unwrap().push(task.call.task_id.clone());

                let result = if failing.contains(&task.call.task_id) {
                    Err(taskdag::report::CapturedError::new("fake failure"))
                } else {
                    Ok(TaskSignal::Done)
                };

                tx.send(ExecEvent {
                    task: task.index,
                    started_at: chrono::Utc::now(),
                    duration_s: 0.0,
                    result,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
