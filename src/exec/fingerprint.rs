// src/exec/fingerprint.rs

//! Node fingerprints and the task modification hash.

use std::io::Read;
use std::path::Path;

use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;
use crate::nodes::{Fingerprint, Node};
use crate::task::Task;

/// Built-in fingerprint of a node; the default `node_fingerprint` hook
/// listener delegates here.
pub fn node_fingerprint(node: &Node, fs: &dyn FileSystem, small_file_threshold: u64) -> Fingerprint {
    match node {
        Node::Path(p) => path_fingerprint(&p.path, fs, small_file_threshold),
        Node::Value(v) => {
            let mut token = String::new();
            v.payload.render(&mut token);
            Fingerprint::Value { token }
        }
    }
}

/// Fingerprint of a path: a streaming content hash for small files,
/// `(size, mtime_ns)` beyond the threshold. Never errors — a missing
/// file yields `Absent`.
pub fn path_fingerprint(path: &Path, fs: &dyn FileSystem, small_file_threshold: u64) -> Fingerprint {
    let Some(stat) = fs.stat(path) else {
        return Fingerprint::Absent;
    };

    if stat.size > small_file_threshold {
        return Fingerprint::SizeMtime {
            size: stat.size,
            mtime_ns: stat.mtime_ns,
        };
    }

    match hash_file(path, fs) {
        Ok(hash) => Fingerprint::Content { hash },
        Err(error) => {
            // The file vanished or turned unreadable mid-run; fall back to
            // the stat we already took.
            debug!(path = %path.display(), %error, "content hash failed; using stat fingerprint");
            Fingerprint::SizeMtime {
                size: stat.size,
                mtime_ns: stat.mtime_ns,
            }
        }
    }
}

fn hash_file(path: &Path, fs: &dyn FileSystem) -> anyhow::Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = fs.open_read(path)?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash standing in for the task callable's source: the user-supplied
/// digest when present, always combined with the task id and the rendered
/// mark set so metadata changes invalidate stored state.
pub fn task_hash(task: &Task) -> String {
    let mut hasher = Hasher::new();
    hasher.update(task.id.as_bytes());
    hasher.update(&[0]);
    if let Some(digest) = &task.digest {
        hasher.update(digest.as_bytes());
    }
    hasher.update(&[0]);
    hasher.update(task.marks.render().as_bytes());
    hasher.finalize().to_hex().to_string()
}
