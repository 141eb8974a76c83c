//! End-to-end build scenarios over an in-memory filesystem and state
//! database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use taskdag::fs::mock::MockFileSystem;
use taskdag::fs::FileSystem;
use taskdag::state::{FileStateStore, Role, StateStore};
use taskdag::{marks, Config, ExitCode, Outcome, Project, Session};
use taskdag_test_utils::builders::ProjectBuilder;

const STATE_PATH: &str = "/proj/.taskdag/state.json";

fn config() -> Config {
    Config {
        state_path: PathBuf::from(STATE_PATH),
        ..Config::default()
    }
}

fn session(project: Project, fs: &MockFileSystem) -> Session {
    let fs: Arc<MockFileSystem> = Arc::new(fs.clone());
    let state = Box::new(FileStateStore::open(fs.clone(), PathBuf::from(STATE_PATH)));
    Session::with_parts(project, config(), fs, state).unwrap()
}

fn chain_project() -> (Project, MockFileSystem, taskdag_test_utils::builders::RunLog) {
    ProjectBuilder::new("/proj/task_build.rs")
        .writer("task_a", vec![marks::produces("out/a.txt")], "alpha")
        .copier(
            "task_b",
            vec![
                marks::depends_on("out/a.txt"),
                marks::produces("out/b.txt"),
            ],
        )
        .build()
}

fn outcome_of(report: &taskdag::RunReport, task: &str) -> Outcome {
    report
        .execution
        .iter()
        .find(|r| r.task_id.ends_with(task))
        .unwrap_or_else(|| panic!("no execution report for {task}"))
        .outcome
}

#[tokio::test]
async fn first_build_runs_both_tasks_and_commits_state() {
    let (project, fs, log) = chain_project();
    let session = session(project, &fs);

    let report = session.build().await;

    assert_eq!(report.exit, ExitCode::Ok);
    assert_eq!(outcome_of(&report, "task_a"), Outcome::Success);
    assert_eq!(outcome_of(&report, "task_b"), Outcome::Success);
    assert_eq!(log.executed(), vec!["task_a", "task_b"]);
    assert_eq!(fs.read_to_string(Path::new("/proj/out/b.txt")).unwrap(), "alpha");

    // The state database holds records for every declared artifact.
    let state = FileStateStore::open(Arc::new(fs), PathBuf::from(STATE_PATH));
    let a = "/proj/task_build.rs::task_a";
    let b = "/proj/task_build.rs::task_b";
    assert!(state.get(a, "/proj/out/a.txt", Role::Prod).is_some());
    assert!(state.get(b, "/proj/out/a.txt", Role::Dep).is_some());
    assert!(state.get(b, "/proj/out/b.txt", Role::Prod).is_some());
    assert!(state.task_meta(a).is_some());
    assert!(state.task_meta(b).is_some());
}

#[tokio::test]
async fn noop_rerun_skips_both_tasks_unchanged() {
    let (project, fs, log) = chain_project();
    let session = session(project, &fs);

    let first = session.build().await;
    assert_eq!(first.exit, ExitCode::Ok);

    let b_stat_before = fs.stat(Path::new("/proj/out/b.txt")).unwrap();
    let second = session.build().await;

    assert_eq!(second.exit, ExitCode::Ok);
    assert_eq!(outcome_of(&second, "task_a"), Outcome::SkipUnchanged);
    assert_eq!(outcome_of(&second, "task_b"), Outcome::SkipUnchanged);
    // Callables ran exactly once across both builds, and no file was
    // rewritten.
    assert_eq!(log.count("task_a"), 1);
    assert_eq!(log.count("task_b"), 1);
    assert_eq!(fs.stat(Path::new("/proj/out/b.txt")).unwrap(), b_stat_before);
}

#[tokio::test]
async fn upstream_content_change_reruns_the_chain() {
    let (project, fs, log) = ProjectBuilder::new("/proj/task_build.rs")
        .copier(
            "task_a",
            vec![
                marks::depends_on("data/in.csv"),
                marks::produces("out/a.txt"),
            ],
        )
        .copier(
            "task_b",
            vec![
                marks::depends_on("out/a.txt"),
                marks::produces("out/b.txt"),
            ],
        )
        .build();
    fs.add_file("/proj/data/in.csv", "v1");

    let session = session(project, &fs);
    assert_eq!(session.build().await.exit, ExitCode::Ok);

    fs.add_file("/proj/data/in.csv", "v2");
    let rerun = session.build().await;

    assert_eq!(outcome_of(&rerun, "task_a"), Outcome::Success);
    assert_eq!(outcome_of(&rerun, "task_b"), Outcome::Success);
    assert_eq!(log.count("task_a"), 2);
    assert_eq!(log.count("task_b"), 2);
    assert_eq!(fs.read_to_string(Path::new("/proj/out/b.txt")).unwrap(), "v2");
}

#[tokio::test]
async fn touch_without_content_change_stays_unchanged() {
    let (project, fs, _log) = ProjectBuilder::new("/proj/task_build.rs")
        .copier(
            "task_a",
            vec![
                marks::depends_on("data/in.csv"),
                marks::produces("out/a.txt"),
            ],
        )
        .build();
    fs.add_file("/proj/data/in.csv", "same");

    let session = session(project, &fs);
    assert_eq!(session.build().await.exit, ExitCode::Ok);

    // Same content, fresh mtime: the content hash decides.
    fs.touch("/proj/data/in.csv");
    let rerun = session.build().await;
    assert_eq!(outcome_of(&rerun, "task_a"), Outcome::SkipUnchanged);
}

#[tokio::test]
async fn failure_propagates_to_descendants() {
    let (project, fs, log) = ProjectBuilder::new("/proj/task_build.rs")
        .failing("task_a", vec![marks::produces("out/a.txt")], "boom")
        .copier(
            "task_b",
            vec![
                marks::depends_on("out/a.txt"),
                marks::produces("out/b.txt"),
            ],
        )
        .build();

    let session = session(project, &fs);
    let report = session.build().await;

    assert_eq!(report.exit, ExitCode::Failed);
    assert_eq!(outcome_of(&report, "task_a"), Outcome::Fail);
    assert_eq!(outcome_of(&report, "task_b"), Outcome::SkipAncestorFailed);
    // The failed ancestor's callable ran; the descendant's never did.
    assert_eq!(log.executed(), vec!["task_a"]);

    let failed = report
        .execution
        .iter()
        .find(|r| r.outcome == Outcome::Fail)
        .unwrap();
    assert!(failed.error.as_ref().unwrap().message.contains("boom"));
}

#[tokio::test]
async fn task_hash_change_invalidates_stored_state() {
    let shared = MockFileSystem::new();

    // One generation of the project, with the given callable digest.
    let build = |digest: &str| {
        let (mut project, fs, log) = ProjectBuilder::with_fs("/proj/task_build.rs", shared.clone())
            .writer("task_a", vec![marks::produces("out/a.txt")], "alpha")
            .build();
        project.modules[0].decls[0] = project.modules[0].decls[0].clone().digest(digest);
        (project, fs, log)
    };

    let (project, fs, log1) = build("v1");
    assert_eq!(session(project, &fs).build().await.exit, ExitCode::Ok);
    assert_eq!(log1.executed().len(), 1);

    // Same artifacts, new digest: the task hash changed, so the task must
    // run again even though every fingerprint matches.
    let (project, fs, log2) = build("v2");
    let report = session(project, &fs).build().await;
    assert_eq!(outcome_of(&report, "task_a"), Outcome::Success);
    assert_eq!(log2.executed().len(), 1);
}
