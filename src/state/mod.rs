// src/state/mod.rs

//! Persisted per-node fingerprints and per-task metadata.
//!
//! Records are keyed `(task_id, node_id, role)` and carry the fingerprint
//! last observed together with the task hash it was observed under. One
//! metadata record per task stores the hash, last outcome, and duration.
//!
//! The file store keeps everything in a single JSON document and rewrites
//! it atomically (temp file + rename) on every commit, so a task's upsert
//! is all-or-nothing. An unreadable or schema-incompatible file is
//! recreated with a warning and the run proceeds as a full rebuild.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::nodes::Fingerprint;
use crate::types::{NodeId, Outcome, TaskId};

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Whether a record belongs to a dependency or a product of its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dep,
    Prod,
}

impl Role {
    fn key_part(self) -> &'static str {
        match self {
            Role::Dep => "dep",
            Role::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub fingerprint: Fingerprint,
    pub task_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_hash: String,
    pub last_outcome: Outcome,
    pub last_duration_s: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TaskEntry {
    meta: TaskMeta,
    /// Keyed `"<role>|<node_id>"`.
    records: BTreeMap<String, NodeRecord>,
}

impl Default for TaskMeta {
    fn default() -> Self {
        Self {
            task_hash: String::new(),
            last_outcome: Outcome::Skip,
            last_duration_s: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateDoc {
    schema: u32,
    tasks: BTreeMap<TaskId, TaskEntry>,
}

impl Default for StateDoc {
    fn default() -> Self {
        Self {
            schema: STATE_SCHEMA_VERSION,
            tasks: BTreeMap::new(),
        }
    }
}

fn record_key(node_id: &str, role: Role) -> String {
    format!("{}|{}", role.key_part(), node_id)
}

/// Persistence contract consumed by the execution engine.
///
/// `put` upserts all records of one task plus its metadata in a single
/// transaction; implementations serialize writers.
pub trait StateStore: Send {
    fn get(&self, task_id: &str, node_id: &str, role: Role) -> Option<NodeRecord>;
    fn task_meta(&self, task_id: &str) -> Option<TaskMeta>;
    fn put(
        &mut self,
        task_id: &str,
        meta: TaskMeta,
        records: Vec<(NodeId, Role, Fingerprint)>,
    ) -> Result<()>;
    fn drop_task(&mut self, task_id: &str) -> Result<()>;
    /// All task ids with stored state, for `clean`/`profile`.
    fn task_ids(&self) -> Vec<TaskId>;
    /// Rewrite the backing storage in its most compact form.
    fn compact(&mut self) -> Result<()>;
}

fn doc_get(doc: &StateDoc, task_id: &str, node_id: &str, role: Role) -> Option<NodeRecord> {
    doc.tasks
        .get(task_id)
        .and_then(|entry| entry.records.get(&record_key(node_id, role)))
        .cloned()
}

fn doc_put(
    doc: &mut StateDoc,
    task_id: &str,
    meta: TaskMeta,
    records: Vec<(NodeId, Role, Fingerprint)>,
) {
    let task_hash = meta.task_hash.clone();
    let entry = doc.tasks.entry(task_id.to_string()).or_default();
    entry.meta = meta;
    entry.records.clear();
    for (node_id, role, fingerprint) in records {
        entry.records.insert(
            record_key(&node_id, role),
            NodeRecord {
                fingerprint,
                task_hash: task_hash.clone(),
            },
        );
    }
}

/// JSON-file-backed store; the production default.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    doc: StateDoc,
}

impl FileStateStore {
    /// Open (or initialize) the store at `path`.
    pub fn open(fs: Arc<dyn FileSystem>, path: PathBuf) -> Self {
        let doc = if fs.is_file(&path) {
            match fs
                .read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<StateDoc>(&text).map_err(|e| e.to_string()))
            {
                Ok(doc) if doc.schema == STATE_SCHEMA_VERSION => doc,
                Ok(doc) => {
                    warn!(
                        path = %path.display(),
                        found = doc.schema,
                        expected = STATE_SCHEMA_VERSION,
                        "state database schema is incompatible; recreating"
                    );
                    StateDoc::default()
                }
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        %error,
                        "state database is unreadable; treating all records as absent"
                    );
                    StateDoc::default()
                }
            }
        } else {
            debug!(path = %path.display(), "no state database yet; starting fresh");
            StateDoc::default()
        };

        Self { path, fs, doc }
    }

    fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.doc)
            .map_err(|e| anyhow::anyhow!("serializing state database: {e}"))?;
        self.fs.write_atomic(&self.path, text.as_bytes())?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, task_id: &str, node_id: &str, role: Role) -> Option<NodeRecord> {
        doc_get(&self.doc, task_id, node_id, role)
    }

    fn task_meta(&self, task_id: &str) -> Option<TaskMeta> {
        self.doc.tasks.get(task_id).map(|entry| entry.meta.clone())
    }

    fn put(
        &mut self,
        task_id: &str,
        meta: TaskMeta,
        records: Vec<(NodeId, Role, Fingerprint)>,
    ) -> Result<()> {
        doc_put(&mut self.doc, task_id, meta, records);
        self.save()?;
        debug!(task = %task_id, "state committed");
        Ok(())
    }

    fn drop_task(&mut self, task_id: &str) -> Result<()> {
        if self.doc.tasks.remove(task_id).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn task_ids(&self) -> Vec<TaskId> {
        self.doc.tasks.keys().cloned().collect()
    }

    fn compact(&mut self) -> Result<()> {
        self.save()
    }
}

/// Memory-only store for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    doc: StateDoc,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, task_id: &str, node_id: &str, role: Role) -> Option<NodeRecord> {
        doc_get(&self.doc, task_id, node_id, role)
    }

    fn task_meta(&self, task_id: &str) -> Option<TaskMeta> {
        self.doc.tasks.get(task_id).map(|entry| entry.meta.clone())
    }

    fn put(
        &mut self,
        task_id: &str,
        meta: TaskMeta,
        records: Vec<(NodeId, Role, Fingerprint)>,
    ) -> Result<()> {
        doc_put(&mut self.doc, task_id, meta, records);
        Ok(())
    }

    fn drop_task(&mut self, task_id: &str) -> Result<()> {
        self.doc.tasks.remove(task_id);
        Ok(())
    }

    fn task_ids(&self) -> Vec<TaskId> {
        self.doc.tasks.keys().cloned().collect()
    }

    fn compact(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::path::Path;

    fn meta(hash: &str) -> TaskMeta {
        TaskMeta {
            task_hash: hash.to_string(),
            last_outcome: Outcome::Success,
            last_duration_s: 0.5,
        }
    }

    fn fp(hash: &str) -> Fingerprint {
        Fingerprint::Content {
            hash: hash.to_string(),
        }
    }

    #[test]
    fn put_then_get_round_trips_and_drop_clears() {
        let mut store = MemoryStateStore::new();
        store
            .put(
                "m::task_a",
                meta("h1"),
                vec![
                    ("/in.csv".to_string(), Role::Dep, fp("aaa")),
                    ("/out.csv".to_string(), Role::Prod, fp("bbb")),
                ],
            )
            .unwrap();

        let record = store.get("m::task_a", "/in.csv", Role::Dep).unwrap();
        assert_eq!(record.fingerprint, fp("aaa"));
        assert_eq!(record.task_hash, "h1");
        // Role is part of the key.
        assert!(store.get("m::task_a", "/in.csv", Role::Prod).is_none());

        store.drop_task("m::task_a").unwrap();
        assert!(store.get("m::task_a", "/in.csv", Role::Dep).is_none());
        assert!(store.task_meta("m::task_a").is_none());
    }

    #[test]
    fn put_replaces_the_whole_record_set_of_a_task() {
        let mut store = MemoryStateStore::new();
        store
            .put(
                "t",
                meta("h1"),
                vec![("/stale.txt".to_string(), Role::Dep, fp("old"))],
            )
            .unwrap();
        store
            .put(
                "t",
                meta("h2"),
                vec![("/fresh.txt".to_string(), Role::Dep, fp("new"))],
            )
            .unwrap();

        assert!(store.get("t", "/stale.txt", Role::Dep).is_none());
        assert_eq!(store.task_meta("t").unwrap().task_hash, "h2");
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/proj/.taskdag/state.json");

        let mut store = FileStateStore::open(fs.clone(), path.clone());
        store
            .put(
                "t",
                meta("h1"),
                vec![("/out.txt".to_string(), Role::Prod, fp("ccc"))],
            )
            .unwrap();
        drop(store);

        let reopened = FileStateStore::open(fs, path);
        assert_eq!(
            reopened.get("t", "/out.txt", Role::Prod).unwrap().fingerprint,
            fp("ccc")
        );
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/proj/.taskdag/state.json", "{ not json");
        let store = FileStateStore::open(fs, PathBuf::from("/proj/.taskdag/state.json"));
        assert!(store.task_ids().is_empty());
    }

    #[test]
    fn incompatible_schema_is_recreated() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file(
            "/proj/.taskdag/state.json",
            r#"{"schema": 99, "tasks": {"t": {"meta": {"task_hash": "h", "last_outcome": "success", "last_duration_s": 0.0}, "records": {}}}}"#,
        );
        let store = FileStateStore::open(fs, PathBuf::from("/proj/.taskdag/state.json"));
        assert!(store.task_meta("t").is_none());
    }

    #[test]
    fn file_store_leaves_no_temp_file_behind() {
        let fs = Arc::new(MockFileSystem::new());
        let path = PathBuf::from("/proj/.taskdag/state.json");
        let mut store = FileStateStore::open(fs.clone(), path.clone());
        store.put("t", meta("h"), vec![]).unwrap();
        assert!(fs.exists(&path));
        assert!(!fs.exists(Path::new("/proj/.taskdag/state.json.tmp")));
    }
}
