// src/lib.rs

//! Incremental task-graph build runner.
//!
//! Tasks are Rust closures registered in a [`Project`], annotated with
//! marks declaring dependency and product artifacts. A [`Session`]
//! collects them, resolves a bipartite DAG over tasks and nodes, and
//! executes the out-of-date subset in topological order, with persisted
//! fingerprints deciding what to skip.
//!
//! ```no_run
//! use taskdag::{cli, marks, Project, TaskDecl, TaskModule, TaskSignal};
//!
//! #[tokio::main]
//! async fn main() {
//!     let project = Project::new().module(
//!         TaskModule::new("tasks/task_data.rs").decl(
//!             TaskDecl::new("task_fetch", |ctx| {
//!                 std::fs::write(ctx.product_path()?, "rows")?;
//!                 Ok(TaskSignal::Done)
//!             })
//!             .mark(marks::produces("out/raw.csv")),
//!         ),
//!     );
//!
//!     let code = cli::run_cli(project, cli::parse()).await;
//!     std::process::exit(code);
//! }
//! ```

pub mod cli;
pub mod collect;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod hooks;
pub mod logging;
pub mod marks;
pub mod nodes;
pub mod report;
pub mod session;
pub mod state;
pub mod task;
pub mod types;

pub use config::Config;
pub use errors::{Result, TaskdagError};
pub use exec::{ResolvedNode, TaskContext};
pub use hooks::HookRegistry;
pub use marks::{Mark, MarkSet, MarkValue};
pub use nodes::{Fingerprint, Node};
pub use report::RunReport;
pub use session::Session;
pub use task::{Project, Task, TaskDecl, TaskModule};
pub use types::{ExitCode, Outcome, TaskResult, TaskSignal};
