#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use taskdag::fs::mock::MockFileSystem;
use taskdag::fs::FileSystem;
use taskdag::marks::Mark;
use taskdag::state::MemoryStateStore;
use taskdag::{Config, Project, Session, TaskContext, TaskDecl, TaskModule, TaskResult, TaskSignal};

/// Records which tasks actually invoked their callable, for assertions
/// on skip semantics.
#[derive(Clone, Default)]
pub struct RunLog {
    executed: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.executed.lock().unwrap().push(name.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }
}

/// Builder for a single-module project of small file tasks running over
/// a shared mock filesystem.
pub struct ProjectBuilder {
    fs: MockFileSystem,
    log: RunLog,
    module: TaskModule,
}

impl ProjectBuilder {
    pub fn new(module_path: &str) -> Self {
        Self::with_fs(module_path, MockFileSystem::new())
    }

    /// Build over an existing filesystem, e.g. to persist files across
    /// project generations.
    pub fn with_fs(module_path: &str, fs: MockFileSystem) -> Self {
        Self {
            fs,
            log: RunLog::new(),
            module: TaskModule::new(module_path),
        }
    }

    /// The filesystem shared by every task of this builder.
    pub fn fs(&self) -> MockFileSystem {
        self.fs.clone()
    }

    pub fn log(&self) -> RunLog {
        self.log.clone()
    }

    /// A task that writes `content` to its single product.
    pub fn writer(self, name: &str, marks: Vec<Mark>, content: &str) -> Self {
        let fs = self.fs.clone();
        let log = self.log.clone();
        let task_name = name.to_string();
        let content = content.to_string();
        self.decl(name, marks, move |ctx| {
            log.record(&task_name);
            fs.write(ctx.product_path()?, content.as_bytes())?;
            Ok(TaskSignal::Done)
        })
    }

    /// A task that copies its single dependency to its single product.
    pub fn copier(self, name: &str, marks: Vec<Mark>) -> Self {
        let fs = self.fs.clone();
        let log = self.log.clone();
        let task_name = name.to_string();
        self.decl(name, marks, move |ctx| {
            log.record(&task_name);
            let input = fs.read_to_string(ctx.dep_path()?)?;
            fs.write(ctx.product_path()?, input.as_bytes())?;
            Ok(TaskSignal::Done)
        })
    }

    /// A task whose callable errors with `message`.
    pub fn failing(self, name: &str, marks: Vec<Mark>, message: &str) -> Self {
        let log = self.log.clone();
        let task_name = name.to_string();
        let message = message.to_string();
        self.decl(name, marks, move |_ctx| {
            log.record(&task_name);
            Err(anyhow::anyhow!("{message}"))
        })
    }

    /// A task with an arbitrary callable. Callables should record
    /// themselves on the [`RunLog`] when assertions need it.
    pub fn decl<F>(mut self, name: &str, marks: Vec<Mark>, func: F) -> Self
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        let mut decl = TaskDecl::new(name, func);
        for mark in marks {
            decl = decl.mark(mark);
        }
        self.module.decls.push(decl);
        self
    }

    pub fn build(self) -> (Project, MockFileSystem, RunLog) {
        (
            Project::new().module(self.module),
            self.fs,
            self.log,
        )
    }
}

/// An in-memory session over the given mock filesystem.
pub fn mem_session(project: Project, config: Config, fs: MockFileSystem) -> Session {
    Session::with_parts(
        project,
        config,
        Arc::new(fs),
        Box::new(MemoryStateStore::new()),
    )
    .expect("test config must validate")
}
