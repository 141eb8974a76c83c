// src/report.rs

//! Typed reports for the collection, resolution, and execution stages,
//! plus the per-run aggregate with its exit code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::types::{ExitCode, Outcome, TaskId};

/// A captured failure, kept as a rendered message chain so reports stay
/// cloneable and serializable.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedError {
    pub message: String,
}

impl CapturedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Render an error with its context chain (`{:#}`).
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: format!("{err:#}"),
        }
    }
}

impl std::fmt::Display for CapturedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Fail,
    Skip,
}

/// One considered item during collection (a task, or a whole declaration
/// that failed to expand).
#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub item: String,
    pub outcome: StageOutcome,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CapturedError>,
}

impl CollectionReport {
    pub fn success(item: impl Into<String>, duration_s: f64) -> Self {
        Self {
            item: item.into(),
            outcome: StageOutcome::Success,
            duration_s,
            error: None,
        }
    }

    pub fn fail(item: impl Into<String>, duration_s: f64, error: CapturedError) -> Self {
        Self {
            item: item.into(),
            outcome: StageOutcome::Fail,
            duration_s,
            error: Some(error),
        }
    }

    pub fn skip(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            outcome: StageOutcome::Skip,
            duration_s: 0.0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub outcome: StageOutcome,
    pub n_tasks: usize,
    pub n_nodes: usize,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CapturedError>,
}

/// Terminal record of one task within the execution stage.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub task_id: TaskId,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CapturedError>,
}

/// Aggregate of one run, append-only while the run progresses.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub exit: ExitCode,
    pub collection: Vec<CollectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionReport>,
    pub execution: Vec<ExecutionReport>,
}

impl RunReport {
    /// Combine stage outcomes into the final exit code: the
    /// highest-precedence condition wins.
    pub fn assemble(
        collection: Vec<CollectionReport>,
        resolution: Option<ResolutionReport>,
        execution: Vec<ExecutionReport>,
        aborted: bool,
    ) -> Self {
        let mut exit = ExitCode::Ok;

        if collection
            .iter()
            .any(|r| r.outcome == StageOutcome::Fail)
        {
            exit = exit.combine(ExitCode::CollectionFailed);
        }
        if resolution
            .as_ref()
            .is_some_and(|r| r.outcome == StageOutcome::Fail)
        {
            exit = exit.combine(ExitCode::ResolutionFailed);
        }
        if execution.iter().any(|r| r.outcome == Outcome::Fail) {
            exit = exit.combine(ExitCode::Failed);
        }
        if aborted {
            exit = exit.combine(ExitCode::Aborted);
        }

        Self {
            exit,
            collection,
            resolution,
            execution,
        }
    }

    /// A run that never got past configuration validation.
    pub fn configuration_failed() -> Self {
        Self {
            exit: ExitCode::ConfigurationFailed,
            collection: Vec::new(),
            resolution: None,
            execution: Vec::new(),
        }
    }

    /// Stable machine-readable export.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "exit_code": self.exit.code(),
            "collection": self.collection,
            "resolution": self.resolution,
            "execution": self.execution,
        })
    }

    /// One human-readable summary line per stage.
    pub fn log_summary(&self) {
        let collected = self
            .collection
            .iter()
            .filter(|r| r.outcome == StageOutcome::Success)
            .count();
        let collect_failed = self
            .collection
            .iter()
            .filter(|r| r.outcome == StageOutcome::Fail)
            .count();
        info!(collected, failed = collect_failed, "collection finished");

        if let Some(res) = &self.resolution {
            info!(
                outcome = ?res.outcome,
                tasks = res.n_tasks,
                nodes = res.n_nodes,
                "resolution finished"
            );
        }

        let count = |o: Outcome| self.execution.iter().filter(|r| r.outcome == o).count();
        info!(
            succeeded = count(Outcome::Success),
            failed = count(Outcome::Fail),
            skipped = count(Outcome::Skip),
            unchanged = count(Outcome::SkipUnchanged),
            ancestor_failed = count(Outcome::SkipAncestorFailed),
            persisted = count(Outcome::Persisted),
            exit = self.exit.code(),
            "run finished"
        );
    }
}
