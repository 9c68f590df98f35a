//! Query filter expressions.
//!
//! Expressions are built with the fluent constructors (`Expr::prop("age")
//! .gt(30)`) and evaluated per document. Comparisons across value types are
//! false rather than an error; a missing property makes every comparison on
//! it false (`is_missing` is the way to test for absence).

use crate::error::Result;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[doc(hidden)]
pub enum CmpOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

/// A query filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted property path into the document body.
    Property(String),
    /// Literal value.
    Literal(Value),
    /// Binary comparison.
    #[doc(hidden)]
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// All operands true.
    And(Vec<Expr>),
    /// Any operand true.
    Or(Vec<Expr>),
    /// Operand false.
    Not(Box<Expr>),
    /// SQL-style pattern match (`%` any run, `_` one character).
    Like(Box<Expr>, String),
    /// Operand between two inclusive bounds.
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Property absent from the document.
    IsMissing(String),
    /// Full-text match against a named index.
    Match {
        /// Name of the full-text index to search.
        index: String,
        /// Query text; tokens combine with AND semantics.
        text: String,
    },
}

impl Expr {
    /// A property path operand.
    pub fn prop(path: impl Into<String>) -> Self {
        Self::Property(path.into())
    }

    /// A literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Equality comparison.
    pub fn eq(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Eq, Box::new(self), Box::new(Self::literal(other)))
    }

    /// Inequality comparison.
    pub fn neq(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Neq, Box::new(self), Box::new(Self::literal(other)))
    }

    /// Less-than comparison.
    pub fn lt(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Lt, Box::new(self), Box::new(Self::literal(other)))
    }

    /// Less-than-or-equal comparison.
    pub fn lte(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Lte, Box::new(self), Box::new(Self::literal(other)))
    }

    /// Greater-than comparison.
    pub fn gt(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Gt, Box::new(self), Box::new(Self::literal(other)))
    }

    /// Greater-than-or-equal comparison.
    pub fn gte(self, other: impl Into<Value>) -> Self {
        Self::Cmp(CmpOp::Gte, Box::new(self), Box::new(Self::literal(other)))
    }

    /// SQL-style `LIKE` pattern match on this operand.
    pub fn like(self, pattern: impl Into<String>) -> Self {
        Self::Like(Box::new(self), pattern.into())
    }

    /// Inclusive range test on this operand.
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Between(
            Box::new(self),
            Box::new(Self::literal(low)),
            Box::new(Self::literal(high)),
        )
    }

    /// True when the property path is absent.
    pub fn is_missing(path: impl Into<String>) -> Self {
        Self::IsMissing(path.into())
    }

    /// Conjunction of both expressions.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Self::And(mut ops) => {
                ops.push(other);
                Self::And(ops)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction of both expressions.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Self::Or(mut ops) => {
                ops.push(other);
                Self::Or(ops)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Full-text match against the named index.
    pub fn matches(index: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Match {
            index: index.into(),
            text: text.into(),
        }
    }

    /// Collects every `Match` node in the tree.
    pub(crate) fn collect_matches(&self, out: &mut Vec<(String, String)>) {
        match self {
            Self::Match { index, text } => out.push((index.clone(), text.clone())),
            Self::Cmp(_, a, b) => {
                a.collect_matches(out);
                b.collect_matches(out);
            }
            Self::And(ops) | Self::Or(ops) => {
                for op in ops {
                    op.collect_matches(out);
                }
            }
            Self::Not(op) | Self::Like(op, _) => op.collect_matches(out),
            Self::Between(op, lo, hi) => {
                op.collect_matches(out);
                lo.collect_matches(out);
                hi.collect_matches(out);
            }
            Self::Property(_) | Self::Literal(_) | Self::IsMissing(_) => {}
        }
    }

    /// Evaluates the expression against one document.
    pub(crate) fn eval(&self, doc_id: &str, body: &Value, fts: &FtsHits) -> Result<bool> {
        Ok(match self {
            Self::Cmp(op, a, b) => {
                match (a.resolve(body), b.resolve(body)) {
                    (Some(left), Some(right)) => apply_cmp(*op, left, right),
                    _ => false,
                }
            }
            Self::And(ops) => {
                for op in ops {
                    if !op.eval(doc_id, body, fts)? {
                        return Ok(false);
                    }
                }
                true
            }
            Self::Or(ops) => {
                for op in ops {
                    if op.eval(doc_id, body, fts)? {
                        return Ok(true);
                    }
                }
                false
            }
            Self::Not(op) => !op.eval(doc_id, body, fts)?,
            Self::Like(op, pattern) => match op.resolve(body) {
                Some(Value::String(s)) => like_match(s, pattern),
                _ => false,
            },
            Self::Between(op, lo, hi) => {
                match (op.resolve(body), lo.resolve(body), hi.resolve(body)) {
                    (Some(v), Some(lo), Some(hi)) => {
                        apply_cmp(CmpOp::Gte, v, lo) && apply_cmp(CmpOp::Lte, v, hi)
                    }
                    _ => false,
                }
            }
            Self::IsMissing(path) => body.at_path(path).is_none(),
            Self::Match { index, text } => fts.contains(index, text, doc_id),
            // Bare operands are not boolean predicates.
            Self::Property(path) => matches!(body.at_path(path), Some(Value::Bool(true))),
            Self::Literal(v) => matches!(v, Value::Bool(true)),
        })
    }

    fn resolve<'a>(&'a self, body: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Property(path) => body.at_path(path),
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// Pre-resolved full-text results, keyed by (index, query text).
#[derive(Default)]
pub(crate) struct FtsHits {
    hits: HashMap<(String, String), HashSet<String>>,
}

impl FtsHits {
    pub(crate) fn insert(&mut self, index: String, text: String, ids: HashSet<String>) {
        self.hits.insert((index, text), ids);
    }

    pub(crate) fn get(&self, index: &str, text: &str) -> Option<&HashSet<String>> {
        self.hits.get(&(index.to_string(), text.to_string()))
    }

    fn contains(&self, index: &str, text: &str, doc_id: &str) -> bool {
        self.hits
            .get(&(index.to_string(), text.to_string()))
            .is_some_and(|ids| ids.contains(doc_id))
    }
}

/// Type-aware comparison: numbers compare numerically across `Int`/`Float`,
/// other types only against themselves. Cross-type comparisons yield `None`.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn apply_cmp(op: CmpOp, a: &Value, b: &Value) -> bool {
    match op {
        CmpOp::Eq => compare_values(a, b) == Some(Ordering::Equal) || a == b,
        CmpOp::Neq => {
            // Comparable and unequal; incomparable types are simply unequal.
            a != b && compare_values(a, b) != Some(Ordering::Equal)
        }
        CmpOp::Lt => compare_values(a, b) == Some(Ordering::Less),
        CmpOp::Lte => matches!(
            compare_values(a, b),
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => compare_values(a, b) == Some(Ordering::Greater),
        CmpOp::Gte => matches!(
            compare_values(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// SQL-style pattern matching. `%` matches any run of characters, `_`
/// exactly one. Case-sensitive.
fn like_match(text: &str, pattern: &str) -> bool {
    fn inner(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => {
                (0..=text.len()).any(|skip| inner(&text[skip..], rest))
            }
            Some(('_', rest)) => match text.split_first() {
                Some((_, t)) => inner(t, rest),
                None => false,
            },
            Some((ch, rest)) => match text.split_first() {
                Some((t0, t)) => t0 == ch && inner(t, rest),
                None => false,
            },
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    inner(&text, &pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn body(pairs: &[(&str, Value)]) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Object(m)
    }

    fn eval(expr: &Expr, body: &Value) -> bool {
        expr.eval("d", body, &FtsHits::default()).unwrap()
    }

    #[test]
    fn comparisons() {
        let doc = body(&[("age", Value::Int(30)), ("name", Value::from("ada"))]);
        assert!(eval(&Expr::prop("age").eq(30), &doc));
        assert!(eval(&Expr::prop("age").eq(30.0), &doc));
        assert!(eval(&Expr::prop("age").gt(29), &doc));
        assert!(eval(&Expr::prop("age").lte(30), &doc));
        assert!(!eval(&Expr::prop("age").lt(30), &doc));
        assert!(eval(&Expr::prop("name").eq("ada"), &doc));
        assert!(eval(&Expr::prop("name").neq("bob"), &doc));
    }

    #[test]
    fn missing_property_comparisons_are_false() {
        let doc = body(&[]);
        assert!(!eval(&Expr::prop("age").eq(30), &doc));
        assert!(!eval(&Expr::prop("age").neq(30), &doc));
        assert!(eval(&Expr::is_missing("age"), &doc));
    }

    #[test]
    fn cross_type_comparisons_are_false() {
        let doc = body(&[("age", Value::from("thirty"))]);
        assert!(!eval(&Expr::prop("age").gt(5), &doc));
        assert!(!eval(&Expr::prop("age").eq(5), &doc));
        // Different types are unequal.
        assert!(eval(&Expr::prop("age").neq(5), &doc));
    }

    #[test]
    fn boolean_combinators() {
        let doc = body(&[("a", Value::Int(1)), ("b", Value::Int(2))]);
        let both = Expr::prop("a").eq(1).and(Expr::prop("b").eq(2));
        assert!(eval(&both, &doc));
        let either = Expr::prop("a").eq(9).or(Expr::prop("b").eq(2));
        assert!(eval(&either, &doc));
        assert!(!eval(&Expr::prop("a").eq(1).not(), &doc));
    }

    #[test]
    fn between_inclusive() {
        let doc = body(&[("age", Value::Int(30))]);
        assert!(eval(&Expr::prop("age").between(30, 40), &doc));
        assert!(eval(&Expr::prop("age").between(20, 30), &doc));
        assert!(!eval(&Expr::prop("age").between(31, 40), &doc));
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("hello", "hello"));
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "%llo"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%"));
        assert!(!like_match("hello", "H%"));
        assert!(!like_match("hello", "h_o"));
        assert!(like_match("", "%"));
    }

    #[test]
    fn nested_paths() {
        let mut address = BTreeMap::new();
        address.insert("city".to_string(), Value::from("Oslo"));
        let doc = body(&[("address", Value::Object(address))]);
        assert!(eval(&Expr::prop("address.city").eq("Oslo"), &doc));
        assert!(eval(&Expr::is_missing("address.zip"), &doc));
    }

    #[test]
    fn fts_match_uses_resolved_hits() {
        let mut hits = FtsHits::default();
        hits.insert(
            "by-text".to_string(),
            "rust".to_string(),
            ["d1".to_string()].into_iter().collect(),
        );
        let expr = Expr::matches("by-text", "rust");
        let doc = body(&[]);
        assert!(expr.eval("d1", &doc, &hits).unwrap());
        assert!(!expr.eval("d2", &doc, &hits).unwrap());
    }
}
