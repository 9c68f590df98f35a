//! Query planning.
//!
//! The planner inspects top-level conjuncts and picks an index access path
//! when one applies; the full predicate is always re-checked against each
//! candidate, so the chosen path only needs to produce a superset.

use crate::query::expr::{CmpOp, Expr};
use crate::value::Value;
use std::ops::Bound;

/// Chosen access path for a query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    /// Scan every live document.
    FullScan,
    /// Equality probe on a value index's leading path.
    IndexEq { path: String, value: Value },
    /// Range scan on a value index's leading path.
    IndexRange {
        path: String,
        lower: Bound<Value>,
        upper: Bound<Value>,
    },
    /// Candidate set from a full-text index.
    FullText { index: String, text: String },
}

impl Plan {
    /// Human-readable access-path description for `explain()`.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::FullScan => "SCAN collection".to_string(),
            Self::IndexEq { path, .. } => format!("INDEX EQ ON {path}"),
            Self::IndexRange { path, .. } => format!("INDEX RANGE ON {path}"),
            Self::FullText { index, .. } => format!("FTS SEARCH {index}"),
        }
    }
}

/// Picks an access path. `indexed` reports whether a value index led by the
/// given path exists.
pub(crate) fn choose_plan(expr: &Expr, indexed: &dyn Fn(&str) -> bool) -> Plan {
    let conjuncts: Vec<&Expr> = match expr {
        Expr::And(ops) => ops.iter().collect(),
        other => vec![other],
    };

    // Prefer an equality probe, then a range, then FTS.
    let mut range: Option<Plan> = None;
    let mut fts: Option<Plan> = None;
    for conjunct in &conjuncts {
        match conjunct {
            Expr::Cmp(op, a, b) => {
                let (path, value, op) = match (a.as_ref(), b.as_ref()) {
                    (Expr::Property(p), Expr::Literal(v)) => (p, v, *op),
                    (Expr::Literal(v), Expr::Property(p)) => (p, v, flip(*op)),
                    _ => continue,
                };
                if !indexed(path) {
                    continue;
                }
                match op {
                    CmpOp::Eq => {
                        return Plan::IndexEq {
                            path: path.clone(),
                            value: value.clone(),
                        }
                    }
                    CmpOp::Lt => keep_range(&mut range, path, Bound::Unbounded, Bound::Excluded(value.clone())),
                    CmpOp::Lte => keep_range(&mut range, path, Bound::Unbounded, Bound::Included(value.clone())),
                    CmpOp::Gt => keep_range(&mut range, path, Bound::Excluded(value.clone()), Bound::Unbounded),
                    CmpOp::Gte => keep_range(&mut range, path, Bound::Included(value.clone()), Bound::Unbounded),
                    CmpOp::Neq => {}
                }
            }
            Expr::Between(op, lo, hi) => {
                if let (Expr::Property(p), Expr::Literal(lo), Expr::Literal(hi)) =
                    (op.as_ref(), lo.as_ref(), hi.as_ref())
                {
                    if indexed(p) {
                        keep_range_pair(
                            &mut range,
                            p,
                            Bound::Included(lo.clone()),
                            Bound::Included(hi.clone()),
                        );
                    }
                }
            }
            Expr::Match { index, text } => {
                fts.get_or_insert(Plan::FullText {
                    index: index.clone(),
                    text: text.clone(),
                });
            }
            _ => {}
        }
    }

    range.or(fts).unwrap_or(Plan::FullScan)
}

fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Lte => CmpOp::Gte,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Gte => CmpOp::Lte,
        other => other,
    }
}

/// Merges a one-sided bound into the candidate range plan for `path`.
fn keep_range(range: &mut Option<Plan>, path: &str, lower: Bound<Value>, upper: Bound<Value>) {
    match range {
        Some(Plan::IndexRange {
            path: existing,
            lower: lo,
            upper: hi,
        }) if existing == path => {
            if !matches!(lower, Bound::Unbounded) {
                *lo = lower;
            }
            if !matches!(upper, Bound::Unbounded) {
                *hi = upper;
            }
        }
        Some(_) => {}
        None => {
            *range = Some(Plan::IndexRange {
                path: path.to_string(),
                lower,
                upper,
            });
        }
    }
}

fn keep_range_pair(range: &mut Option<Plan>, path: &str, lower: Bound<Value>, upper: Bound<Value>) {
    keep_range(range, path, lower, Bound::Unbounded);
    keep_range(range, path, Bound::Unbounded, upper);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_wins_over_range() {
        let expr = Expr::prop("age").gt(10).and(Expr::prop("age").eq(30));
        let plan = choose_plan(&expr, &|p| p == "age");
        assert_eq!(
            plan,
            Plan::IndexEq {
                path: "age".into(),
                value: Value::Int(30)
            }
        );
    }

    #[test]
    fn range_bounds_merge() {
        let expr = Expr::prop("age").gte(10).and(Expr::prop("age").lt(20));
        let plan = choose_plan(&expr, &|p| p == "age");
        assert_eq!(
            plan,
            Plan::IndexRange {
                path: "age".into(),
                lower: Bound::Included(Value::Int(10)),
                upper: Bound::Excluded(Value::Int(20)),
            }
        );
    }

    #[test]
    fn between_plans_as_range() {
        let expr = Expr::prop("age").between(10, 20);
        let plan = choose_plan(&expr, &|p| p == "age");
        assert_eq!(
            plan,
            Plan::IndexRange {
                path: "age".into(),
                lower: Bound::Included(Value::Int(10)),
                upper: Bound::Included(Value::Int(20)),
            }
        );
    }

    #[test]
    fn unindexed_path_scans() {
        let expr = Expr::prop("age").eq(30);
        assert_eq!(choose_plan(&expr, &|_| false), Plan::FullScan);
    }

    #[test]
    fn reversed_operands() {
        let expr = Expr::literal(30).lt(0); // nonsense shape, stays a scan
        assert_eq!(choose_plan(&expr, &|_| true), Plan::FullScan);

        let expr = Expr::Cmp(
            CmpOp::Lt,
            Box::new(Expr::literal(10)),
            Box::new(Expr::prop("age")),
        );
        let plan = choose_plan(&expr, &|p| p == "age");
        assert_eq!(
            plan,
            Plan::IndexRange {
                path: "age".into(),
                lower: Bound::Excluded(Value::Int(10)),
                upper: Bound::Unbounded,
            }
        );
    }

    #[test]
    fn fts_match_plans_search() {
        let expr = Expr::matches("by-text", "rust");
        let plan = choose_plan(&expr, &|_| false);
        assert_eq!(
            plan,
            Plan::FullText {
                index: "by-text".into(),
                text: "rust".into()
            }
        );
    }

    #[test]
    fn disjunctions_scan() {
        let expr = Expr::prop("age").eq(1).or(Expr::prop("age").eq(2));
        assert_eq!(choose_plan(&expr, &|_| true), Plan::FullScan);
    }
}
