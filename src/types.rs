// src/types.rs

use serde::{Deserialize, Serialize};

/// Display form of a task identifier: `<module path>::<name>[<param id>]`.
pub type TaskId = String;

/// Display form of a node identifier (absolute path for path nodes,
/// the declared key for value nodes).
pub type NodeId = String;

/// Terminal outcome of one task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Fail,
    Skip,
    SkipUnchanged,
    SkipAncestorFailed,
    Persisted,
}

impl Outcome {
    /// Whether downstream tasks may treat this task as satisfied.
    pub fn is_passing(self) -> bool {
        !matches!(self, Outcome::Fail | Outcome::SkipAncestorFailed)
    }
}

/// Process exit code of a whole run.
///
/// When several conditions hold, the highest code wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCode {
    Ok,
    CollectionFailed,
    ResolutionFailed,
    Failed,
    Aborted,
    ConfigurationFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Ok => 0,
            ExitCode::CollectionFailed => 1,
            ExitCode::ResolutionFailed => 2,
            ExitCode::Failed => 3,
            ExitCode::Aborted => 4,
            ExitCode::ConfigurationFailed => 5,
        }
    }

    /// Combine two conditions, keeping the one with higher precedence.
    pub fn combine(self, other: ExitCode) -> ExitCode {
        self.max(other)
    }
}

/// What a task callable reports back to the engine instead of raising
/// sentinel exceptions: either it ran to completion, or it signals a
/// non-standard outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSignal {
    /// The callable did its work; products are expected to exist.
    Done,
    /// The callable decided to skip itself.
    Skipped { reason: String },
    /// Record current fingerprints without insisting the products were
    /// rewritten.
    Persisted,
    /// Abort the whole run after running tasks drain.
    Exit,
}

/// Return channel of a task callable.
pub type TaskResult = std::result::Result<TaskSignal, anyhow::Error>;
