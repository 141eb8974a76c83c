// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Default state database location, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".taskdag/state.json";

/// Content hashing is used for files up to this size; larger files fall
/// back to `(size, mtime_ns)` fingerprints.
pub const DEFAULT_SMALL_FILE_THRESHOLD: u64 = 1024 * 1024;

/// Fully merged runtime configuration consumed by the core.
///
/// Assembled from defaults, an optional `Taskdag.toml`, and CLI
/// overrides; run [`validate`](crate::config::validate::validate) before
/// handing it to a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root paths under which modules are considered. Empty means all
    /// registered modules.
    pub roots: Vec<PathBuf>,
    /// Glob patterns for module paths to skip during collection.
    pub ignore_globs: Vec<String>,
    /// Glob matched against the module file name (default `task_*.rs`).
    pub task_file_pattern: String,
    /// Glob matched against declaration names (default `task_*`).
    pub task_function_pattern: String,
    /// Extra known markers (name -> description) beyond the reserved set.
    pub markers: BTreeMap<String, String>,
    /// Fail collection of a task carrying an unknown marker.
    pub strict_markers: bool,
    /// `-k` keyword selector over task ids.
    pub keyword_expr: Option<String>,
    /// `-m` marker selector over attached mark names.
    pub marker_expr: Option<String>,
    /// Parallelism degree `P >= 1`.
    pub workers: usize,
    /// Stop scheduling after this many failed tasks.
    pub max_failures: Option<usize>,
    pub verbose: bool,
    pub small_file_threshold: u64,
    pub state_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            ignore_globs: Vec::new(),
            task_file_pattern: "task_*.rs".to_string(),
            task_function_pattern: "task_*".to_string(),
            markers: BTreeMap::new(),
            strict_markers: false,
            keyword_expr: None,
            marker_expr: None,
            workers: 1,
            max_failures: None,
            verbose: false,
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

impl Config {
    /// Layer values from a parsed config file over this configuration.
    /// CLI overrides are applied afterwards by the caller.
    pub fn apply_file(&mut self, raw: &RawConfigFile) {
        let collect = &raw.collect;
        if !collect.ignore.is_empty() {
            self.ignore_globs.extend(collect.ignore.iter().cloned());
        }
        if let Some(ref pattern) = collect.task_file_pattern {
            self.task_file_pattern = pattern.clone();
        }
        if let Some(ref pattern) = collect.task_function_pattern {
            self.task_function_pattern = pattern.clone();
        }
        if let Some(strict) = collect.strict_markers {
            self.strict_markers = strict;
        }

        let build = &raw.build;
        if let Some(workers) = build.workers {
            self.workers = workers;
        }
        if let Some(max_failures) = build.max_failures {
            self.max_failures = Some(max_failures);
        }
        if let Some(threshold) = build.small_file_threshold {
            self.small_file_threshold = threshold;
        }
        if let Some(ref path) = build.state_path {
            self.state_path = path.clone();
        }

        for (name, desc) in &raw.markers {
            self.markers.insert(name.clone(), desc.clone());
        }
    }
}

/// Top-level structure of `Taskdag.toml`.
///
/// ```toml
/// [collect]
/// ignore = ["**/archive/**"]
/// strict_markers = true
///
/// [build]
/// workers = 4
///
/// [markers]
/// slow = "tasks that take minutes"
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub collect: CollectSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub markers: BTreeMap<String, String>,
}

/// `[collect]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectSection {
    #[serde(default)]
    pub ignore: Vec<String>,
    pub task_file_pattern: Option<String>,
    pub task_function_pattern: Option<String>,
    pub strict_markers: Option<bool>,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    pub workers: Option<usize>,
    pub max_failures: Option<usize>,
    pub small_file_threshold: Option<u64>,
    pub state_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_layer_over_defaults() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [collect]
            ignore = ["**/old/**"]
            strict_markers = true

            [build]
            workers = 8
            max_failures = 2

            [markers]
            slow = "long-running tasks"
            "#,
        )
        .unwrap();

        let mut cfg = Config::default();
        cfg.apply_file(&raw);

        assert_eq!(cfg.ignore_globs, vec!["**/old/**".to_string()]);
        assert!(cfg.strict_markers);
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.max_failures, Some(2));
        assert_eq!(cfg.markers["slow"], "long-running tasks");
        // Untouched defaults survive.
        assert_eq!(cfg.task_file_pattern, "task_*.rs");
    }

    #[test]
    fn empty_file_changes_nothing() {
        let raw: RawConfigFile = toml::from_str("").unwrap();
        let mut cfg = Config::default();
        cfg.apply_file(&raw);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.state_path, PathBuf::from(DEFAULT_STATE_PATH));
    }
}
