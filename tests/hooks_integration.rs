//! The hook bus at work across a whole session: custom node collection,
//! custom fingerprints, observers, and blocking.

use std::sync::{Arc, Mutex};

use taskdag::nodes::{value_descriptor, Node};
use taskdag::state::MemoryStateStore;
use taskdag::{
    marks, Config, ExitCode, Fingerprint, Outcome, Project, Session, TaskSignal,
};
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

fn outcome_of(report: &taskdag::RunReport, task: &str) -> Outcome {
    report
        .execution
        .iter()
        .find(|r| r.task_id.ends_with(task))
        .unwrap_or_else(|| panic!("no execution report for {task}"))
        .outcome
}

#[tokio::test]
async fn value_nodes_flow_from_descriptor_to_context() {
    let (project, fs, _log) = ProjectBuilder::new("/proj/task_value.rs")
        .decl(
            "task_reads_value",
            vec![marks::depends_on(value_descriptor("threshold", 42))],
            |ctx| {
                let value = ctx
                    .dep()?
                    .payload()
                    .and_then(|v| v.id_fragment())
                    .ok_or_else(|| anyhow::anyhow!("missing payload"))?;
                if value != "42" {
                    return Err(anyhow::anyhow!("unexpected payload {value}"));
                }
                Ok(TaskSignal::Done)
            },
        )
        .build();

    let report = session(project, fs).build().await;
    assert_eq!(report.exit, ExitCode::Ok);
    assert_eq!(outcome_of(&report, "task_reads_value"), Outcome::Success);
}

#[tokio::test]
async fn custom_fingerprint_listener_drives_invalidation() {
    let version = Arc::new(Mutex::new("v1".to_string()));

    let make_session = |fs: taskdag::fs::mock::MockFileSystem, project: Project| {
        let mut session = session(project, fs);
        let version = Arc::clone(&version);
        session
            .configure_hooks(move |hooks| {
                hooks.node_fingerprint.register(
                    "test:dataset-version",
                    move |call: &taskdag::hooks::NodeFingerprintCall| match &call.node {
                        Node::Value(v) if v.key == "dataset" => Ok(Some(Fingerprint::Value {
                            token: version.lock().unwrap().clone(),
                        })),
                        _ => Ok(None),
                    },
                );
            })
            .unwrap();
        session
    };

    let project_gen = || {
        ProjectBuilder::new("/proj/task_ds.rs")
            .decl(
                "task_ingest",
                vec![marks::depends_on(value_descriptor("dataset", "remote"))],
                |_ctx| Ok(TaskSignal::Done),
            )
            .build()
    };

    let (project, fs, _) = project_gen();
    let session1 = make_session(fs.clone(), project);
    assert_eq!(
        outcome_of(&session1.build().await, "task_ingest"),
        Outcome::Success
    );
    // Unchanged external version: up to date.
    assert_eq!(
        outcome_of(&session1.build().await, "task_ingest"),
        Outcome::SkipUnchanged
    );

    // Bump the external version: the custom fingerprint invalidates.
    *version.lock().unwrap() = "v2".to_string();
    assert_eq!(
        outcome_of(&session1.build().await, "task_ingest"),
        Outcome::Success
    );
}

#[tokio::test]
async fn report_task_observers_see_every_outcome() {
    let seen: Arc<Mutex<Vec<(String, Outcome)>>> = Arc::new(Mutex::new(Vec::new()));

    let (project, fs, _log) = ProjectBuilder::new("/proj/task_obs.rs")
        .writer("task_good", vec![marks::produces("out/g.txt")], "g")
        .failing("task_bad", vec![], "nope")
        .build();

    let mut session = session(project, fs);
    {
        let seen = Arc::clone(&seen);
        session
            .configure_hooks(move |hooks| {
                hooks.report_task.register("test:observer", move |report| {
                    seen.lock()
                        .unwrap()
                        .push((report.task_id.clone(), report.outcome));
                    Ok(Some(()))
                });
            })
            .unwrap();
    }

    let report = session.build().await;
    assert_eq!(report.exit, ExitCode::Failed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), report.execution.len());
    assert!(seen.iter().any(|(id, o)| id.ends_with("task_bad") && *o == Outcome::Fail));
    assert!(seen
        .iter()
        .any(|(id, o)| id.ends_with("task_good") && *o == Outcome::Success));
}

#[tokio::test]
async fn blocking_collect_node_makes_descriptors_unresolvable() {
    let (project, fs, _log) = ProjectBuilder::new("/proj/task_blocked.rs")
        .writer("task_a", vec![marks::produces("out/a.txt")], "a")
        .build();

    let mut session = session(project, fs);
    session
        .configure_hooks(|hooks| {
            hooks.collect_node.block();
        })
        .unwrap();

    let report = session.build().await;
    assert_eq!(report.exit, ExitCode::CollectionFailed);
    assert!(report.execution.is_empty());
}

#[tokio::test]
async fn execute_wrapper_observes_and_overrides_results() {
    let (project, fs, log) = ProjectBuilder::new("/proj/task_wrap.rs")
        .failing("task_flaky", vec![], "transient glitch")
        .build();

    let mut session = session(project, fs);
    session
        .configure_hooks(|hooks| {
            // A wrapper that turns one specific failure into a skip.
            hooks
                .task_execute
                .register_wrapper("test:quarantine", |call, inner| {
                    let result = inner()?;
                    if call.task_id.ends_with("task_flaky") {
                        if let Some(Err(_)) = &result {
                            return Ok(Some(Ok(TaskSignal::Skipped {
                                reason: "quarantined".to_string(),
                            })));
                        }
                    }
                    Ok(result)
                });
        })
        .unwrap();

    let report = session.build().await;
    assert_eq!(report.exit, ExitCode::Ok);
    assert_eq!(outcome_of(&report, "task_flaky"), Outcome::Skip);
    // The callable did run; the wrapper replaced its result.
    assert_eq!(log.executed(), vec!["task_flaky"]);
}
