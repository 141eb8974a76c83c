// src/collect/select.rs

//! `-k` / `-m` task selection.
//!
//! Expressions are a needle with an optional leading `not`: `-k report`
//! keeps tasks whose id contains "report", `-m "not slow"` drops tasks
//! carrying the `slow` marker.

use crate::config::Config;
use crate::task::Task;

#[derive(Debug, Clone)]
struct Term {
    negated: bool,
    needle: String,
}

fn parse(expr: &str) -> Term {
    let trimmed = expr.trim();
    match trimmed.strip_prefix("not ") {
        Some(rest) => Term {
            negated: true,
            needle: rest.trim().to_string(),
        },
        None => Term {
            negated: false,
            needle: trimmed.to_string(),
        },
    }
}

/// Compiled selection over collected tasks.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    keyword: Option<Term>,
    marker: Option<Term>,
}

impl Selector {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            keyword: cfg.keyword_expr.as_deref().map(parse),
            marker: cfg.marker_expr.as_deref().map(parse),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyword.is_none() && self.marker.is_none()
    }

    pub fn selects(&self, task: &Task) -> bool {
        if let Some(term) = &self.keyword {
            let hit = task
                .id
                .to_lowercase()
                .contains(&term.needle.to_lowercase());
            if hit == term.negated {
                return false;
            }
        }
        if let Some(term) = &self.marker {
            let hit = task.marks.has(&term.needle);
            if hit == term.negated {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks;
    use crate::task::TaskDecl;
    use crate::types::TaskSignal;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn task_with(id: &str, marks: Vec<crate::marks::Mark>) -> Task {
        let decl = TaskDecl::new("task", |_| Ok(TaskSignal::Done));
        let mut set = crate::marks::MarkSet::new();
        set.set(marks);
        Task {
            id: id.to_string(),
            name: "task".to_string(),
            module: PathBuf::from("task_mod.rs"),
            func: decl.func,
            deps: None,
            products: None,
            params: BTreeMap::new(),
            marks: set,
            try_first: false,
            try_last: false,
            digest: None,
        }
    }

    fn selector(keyword: Option<&str>, marker: Option<&str>) -> Selector {
        let cfg = Config {
            keyword_expr: keyword.map(String::from),
            marker_expr: marker.map(String::from),
            ..Config::default()
        };
        Selector::from_config(&cfg)
    }

    #[test]
    fn keyword_matches_substring_of_task_id() {
        let sel = selector(Some("report"), None);
        assert!(sel.selects(&task_with("task_mod.rs::task_report", vec![])));
        assert!(!sel.selects(&task_with("task_mod.rs::task_data", vec![])));
    }

    #[test]
    fn negated_marker_drops_marked_tasks() {
        let sel = selector(None, Some("not slow"));
        assert!(!sel.selects(&task_with("t", vec![marks::Mark::new("slow")])));
        assert!(sel.selects(&task_with("t", vec![])));
    }

    #[test]
    fn both_terms_must_agree() {
        let sel = selector(Some("data"), Some("slow"));
        assert!(sel.selects(&task_with(
            "m::task_data",
            vec![marks::Mark::new("slow")]
        )));
        assert!(!sel.selects(&task_with("m::task_data", vec![])));
    }
}
