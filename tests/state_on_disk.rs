//! The file-backed state database against a real filesystem.

use std::sync::Arc;

use taskdag::fs::RealFileSystem;
use taskdag::state::{FileStateStore, Role, StateStore};
use taskdag::{marks, Config, ExitCode, Outcome, Project, Session, TaskDecl, TaskModule, TaskSignal};

#[tokio::test]
async fn builds_persist_state_across_sessions_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let state_path = root.join(".taskdag/state.json");

    let module_path = root.join("task_disk.rs");
    let project = || {
        Project::new().module(
            TaskModule::new(&module_path).decl(
                TaskDecl::new("task_write", |ctx| {
                    let path = ctx.product_path()?;
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, "on disk")?;
                    Ok(TaskSignal::Done)
                })
                .mark(marks::produces("out/disk.txt")),
            ),
        )
    };
    let config = || Config {
        state_path: state_path.clone(),
        ..Config::default()
    };

    let first = Session::new(project(), config()).unwrap().build().await;
    assert_eq!(first.exit, ExitCode::Ok);
    assert_eq!(
        std::fs::read_to_string(root.join("out/disk.txt")).unwrap(),
        "on disk"
    );
    assert!(state_path.is_file());

    // A brand-new session reads the same state file and skips.
    let second = Session::new(project(), config()).unwrap().build().await;
    assert_eq!(second.execution[0].outcome, Outcome::SkipUnchanged);
}

#[test]
fn drop_task_round_trips_to_absent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let fs: Arc<RealFileSystem> = Arc::new(RealFileSystem);

    let mut store = FileStateStore::open(fs.clone(), path.clone());
    store
        .put(
            "m::task_a",
            taskdag::state::TaskMeta {
                task_hash: "h".to_string(),
                last_outcome: Outcome::Success,
                last_duration_s: 0.1,
            },
            vec![(
                "/out/a.txt".to_string(),
                Role::Prod,
                taskdag::Fingerprint::Content {
                    hash: "abc".to_string(),
                },
            )],
        )
        .unwrap();
    store.drop_task("m::task_a").unwrap();

    let reopened = FileStateStore::open(fs, path);
    assert!(reopened.get("m::task_a", "/out/a.txt", Role::Prod).is_none());
    assert!(!dir
        .path()
        .read_dir()
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().is_some_and(|ext| ext == "tmp")));
}
