//! Resolution failures surface before execution ever starts.

use std::sync::Arc;

use taskdag::report::StageOutcome;
use taskdag::state::MemoryStateStore;
use taskdag::{marks, Config, ExitCode, Project, Session};
use taskdag_test_utils::builders::ProjectBuilder;

fn session(project: Project, fs: taskdag::fs::mock::MockFileSystem) -> Session {
    Session::with_parts(
        project,
        Config::default(),
        Arc::new(fs),
        Box::new(MemoryStateStore::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn cycle_fails_resolution_and_never_executes() {
    let (project, fs, log) = ProjectBuilder::new("/proj/task_cycle.rs")
        .writer(
            "task_a",
            vec![
                marks::depends_on("out/b.txt"),
                marks::produces("out/a.txt"),
            ],
            "a",
        )
        .writer(
            "task_b",
            vec![
                marks::depends_on("out/a.txt"),
                marks::produces("out/b.txt"),
            ],
            "b",
        )
        .build();

    let report = session(project, fs).build().await;

    assert_eq!(report.exit, ExitCode::ResolutionFailed);
    assert!(report.execution.is_empty());
    assert!(log.executed().is_empty());

    let resolution = report.resolution.unwrap();
    assert_eq!(resolution.outcome, StageOutcome::Fail);
    let message = &resolution.error.unwrap().message;
    assert!(message.contains("task_a") && message.contains("task_b"));
}

#[tokio::test]
async fn duplicate_producers_fail_resolution() {
    let (project, fs, _log) = ProjectBuilder::new("/proj/task_dup.rs")
        .writer("task_a", vec![marks::produces("out/same.txt")], "a")
        .writer("task_b", vec![marks::produces("out/same.txt")], "b")
        .build();

    let report = session(project, fs).build().await;
    assert_eq!(report.exit, ExitCode::ResolutionFailed);
    let message = report.resolution.unwrap().error.unwrap().message;
    assert!(message.contains("produced by both"));
}

#[tokio::test]
async fn missing_external_input_fails_resolution() {
    let (project, fs, _log) = ProjectBuilder::new("/proj/task_missing.rs")
        .copier(
            "task_a",
            vec![
                marks::depends_on("data/never-written.csv"),
                marks::produces("out/a.txt"),
            ],
        )
        .build();

    let report = session(project, fs).build().await;
    assert_eq!(report.exit, ExitCode::ResolutionFailed);
    let message = report.resolution.unwrap().error.unwrap().message;
    assert!(message.contains("missing input"));
    assert!(message.contains("never-written.csv"));
}

#[tokio::test]
async fn collection_failure_stops_before_resolution() {
    // An unresolvable descriptor fails collection of that task; the run
    // ends with the collection exit code and no execution.
    let (project, fs, log) = ProjectBuilder::new("/proj/task_bad.rs")
        .writer(
            "task_bad",
            vec![marks::depends_on(taskdag::MarkValue::from(3.5))],
            "x",
        )
        .writer("task_ok", vec![marks::produces("out/ok.txt")], "ok")
        .build();

    let report = session(project, fs).build().await;
    assert_eq!(report.exit, ExitCode::CollectionFailed);
    assert!(report.resolution.is_none());
    assert!(report.execution.is_empty());
    assert!(log.executed().is_empty());
}

#[test]
fn invalid_configuration_is_rejected_at_session_build() {
    let cfg = Config {
        workers: 0,
        ..Config::default()
    };
    let err = Session::with_parts(
        Project::new(),
        cfg,
        Arc::new(taskdag::fs::mock::MockFileSystem::new()),
        Box::new(MemoryStateStore::new()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, taskdag::TaskdagError::Configuration(_)));
}
