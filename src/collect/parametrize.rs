// src/collect/parametrize.rs

//! Parametrization expansion.
//!
//! Expansion is purely syntactic: a Cartesian product over the value rows
//! of every `parametrize` mark, producing independent concrete tasks.
//! Ids come from an explicit list, a user-supplied id function, or an
//! auto id built from scalar argument values.

use std::collections::BTreeMap;

use crate::marks::{IdFn, Mark, MarkSet, MarkValue};

/// One concrete expansion of a declaration.
#[derive(Debug, Clone)]
pub struct Expansion {
    /// `None` for unparametrized declarations; otherwise the `[...]` id.
    pub suffix: Option<String>,
    /// Bound arguments, by argument name.
    pub params: BTreeMap<String, MarkValue>,
}

/// Expand all `parametrize` marks of a declaration.
pub fn expand(marks: &MarkSet) -> Result<Vec<Expansion>, String> {
    let pmarks = marks.get("parametrize");
    if pmarks.is_empty() {
        return Ok(vec![Expansion {
            suffix: None,
            params: BTreeMap::new(),
        }]);
    }

    let mut groups = Vec::with_capacity(pmarks.len());
    for mark in pmarks {
        groups.push(expand_one(mark)?);
    }

    // Cartesian product across marks; ids of the per-mark rows join with
    // `-` in mark order.
    let mut acc: Vec<(String, BTreeMap<String, MarkValue>)> =
        vec![(String::new(), BTreeMap::new())];
    for group in groups {
        let mut next = Vec::with_capacity(acc.len() * group.len());
        for (id, params) in &acc {
            for (row_id, row_params) in &group {
                let mut merged = params.clone();
                for (name, value) in row_params {
                    if merged.insert(name.clone(), value.clone()).is_some() {
                        return Err(format!(
                            "argument '{name}' is bound by more than one parametrize mark"
                        ));
                    }
                }
                let joined = if id.is_empty() {
                    row_id.clone()
                } else {
                    format!("{id}-{row_id}")
                };
                next.push((joined, merged));
            }
        }
        acc = next;
    }

    Ok(acc
        .into_iter()
        .map(|(id, params)| Expansion {
            suffix: Some(id),
            params,
        })
        .collect())
}

/// Expand a single `parametrize` mark into `(id, bound args)` rows.
fn expand_one(mark: &Mark) -> Result<Vec<(String, BTreeMap<String, MarkValue>)>, String> {
    let argnames: Vec<String> = mark
        .first_arg()
        .and_then(|v| v.as_str())
        .ok_or_else(|| "parametrize needs a comma-separated argument-name string".to_string())?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if argnames.is_empty() {
        return Err("parametrize argument names are empty".to_string());
    }

    let rows = match mark.args.get(1) {
        Some(MarkValue::Seq(rows)) => rows,
        _ => return Err("parametrize needs a sequence of value rows".to_string()),
    };

    enum Ids<'a> {
        Auto,
        Explicit(Vec<&'a str>),
        Func(&'a IdFn),
    }

    let ids = match mark.kwarg("ids") {
        None => Ids::Auto,
        Some(MarkValue::Seq(values)) => {
            let mut explicit = Vec::with_capacity(values.len());
            for value in values {
                explicit.push(
                    value
                        .as_str()
                        .ok_or_else(|| "parametrize ids must be strings".to_string())?,
                );
            }
            if explicit.len() != rows.len() {
                return Err(format!(
                    "parametrize id list has {} entries for {} value rows",
                    explicit.len(),
                    rows.len()
                ));
            }
            Ids::Explicit(explicit)
        }
        Some(MarkValue::Opaque(o)) => match o.as_any().downcast_ref::<IdFn>() {
            Some(func) => Ids::Func(func),
            None => return Err("parametrize ids must be strings or an id function".to_string()),
        },
        Some(_) => {
            return Err("parametrize ids must be a sequence of strings or an id function".to_string())
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let bound = bind_row(&argnames, row, index)?;

        let id = match &ids {
            Ids::Explicit(explicit) => explicit[index].to_string(),
            Ids::Func(func) => (func.0)(row).unwrap_or_else(|| auto_id(&argnames, &bound, index)),
            Ids::Auto => auto_id(&argnames, &bound, index),
        };
        out.push((id, bound));
    }
    Ok(out)
}

fn bind_row(
    argnames: &[String],
    row: &MarkValue,
    index: usize,
) -> Result<BTreeMap<String, MarkValue>, String> {
    let mut bound = BTreeMap::new();
    if argnames.len() == 1 {
        bound.insert(argnames[0].clone(), row.clone());
        return Ok(bound);
    }

    match row {
        MarkValue::Seq(values) if values.len() == argnames.len() => {
            for (name, value) in argnames.iter().zip(values) {
                bound.insert(name.clone(), value.clone());
            }
            Ok(bound)
        }
        MarkValue::Seq(values) => Err(format!(
            "value row {index} has {} entries for {} argument names",
            values.len(),
            argnames.len()
        )),
        _ => Err(format!(
            "value row {index} must be a sequence binding {} argument names",
            argnames.len()
        )),
    }
}

/// Auto id: scalar values joined by `-`; anything else renders as
/// `<argname><index>`.
fn auto_id(argnames: &[String], bound: &BTreeMap<String, MarkValue>, index: usize) -> String {
    argnames
        .iter()
        .map(|name| {
            bound[name]
                .id_fragment()
                .unwrap_or_else(|| format!("{name}{index}"))
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marks::{self, MarkValue};

    fn set_of(mark: crate::marks::Mark) -> MarkSet {
        let mut set = MarkSet::new();
        set.attach(mark);
        set
    }

    #[test]
    fn no_parametrize_yields_one_unsuffixed_expansion() {
        let expansions = expand(&MarkSet::new()).unwrap();
        assert_eq!(expansions.len(), 1);
        assert!(expansions[0].suffix.is_none());
        assert!(expansions[0].params.is_empty());
    }

    #[test]
    fn explicit_ids_are_used_verbatim() {
        let mark = marks::parametrize("i", [1, 2, 3])
            .kw("ids", MarkValue::seq(["one", "two", "three"]));
        let expansions = expand(&set_of(mark)).unwrap();
        let ids: Vec<_> = expansions.iter().map(|e| e.suffix.clone().unwrap()).collect();
        assert_eq!(ids, vec!["one", "two", "three"]);
        assert_eq!(expansions[1].params["i"], MarkValue::Int(2));
    }

    #[test]
    fn id_list_length_mismatch_is_an_error() {
        let mark = marks::parametrize("i", [1, 2]).kw("ids", MarkValue::seq(["only"]));
        let err = expand(&set_of(mark)).unwrap_err();
        assert!(err.contains("1 entries for 2 value rows"));
    }

    #[test]
    fn auto_ids_join_scalars_and_index_nonscalars() {
        let mark = marks::parametrize(
            "a, b",
            [
                MarkValue::seq([MarkValue::from(1), MarkValue::from("x")]),
                MarkValue::seq([MarkValue::from(2), MarkValue::seq([3, 4])]),
            ],
        );
        let expansions = expand(&set_of(mark)).unwrap();
        assert_eq!(expansions[0].suffix.as_deref(), Some("1-x"));
        assert_eq!(expansions[1].suffix.as_deref(), Some("2-b1"));
    }

    #[test]
    fn multiple_marks_take_the_cartesian_product() {
        let mut set = MarkSet::new();
        set.attach(marks::parametrize("i", [1, 2]));
        set.attach(marks::parametrize("j", ["x", "y"]));

        let expansions = expand(&set).unwrap();
        let ids: Vec<_> = expansions.iter().map(|e| e.suffix.clone().unwrap()).collect();
        assert_eq!(ids, vec!["1-x", "1-y", "2-x", "2-y"]);
        assert_eq!(expansions[3].params["i"], MarkValue::Int(2));
        assert_eq!(expansions[3].params["j"], MarkValue::Str("y".into()));
    }

    #[test]
    fn rebinding_an_argument_across_marks_is_an_error() {
        let mut set = MarkSet::new();
        set.attach(marks::parametrize("i", [1]));
        set.attach(marks::parametrize("i", [2]));
        assert!(expand(&set).unwrap_err().contains("more than one"));
    }

    #[test]
    fn id_function_overrides_auto_ids() {
        let mark = marks::parametrize("i", [10, 20]).kw(
            "ids",
            marks::id_fn(|value| value.id_fragment().map(|f| format!("n{f}"))),
        );
        let expansions = expand(&set_of(mark)).unwrap();
        assert_eq!(expansions[0].suffix.as_deref(), Some("n10"));
        assert_eq!(expansions[1].suffix.as_deref(), Some("n20"));
    }
}
