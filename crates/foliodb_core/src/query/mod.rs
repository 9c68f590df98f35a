//! Query engine: one-shot queries and live queries.
//!
//! A [`Query`] pairs a collection with a filter [`Expr`] plus optional
//! ordering, projection, and pagination. Execution is snapshot-isolated over
//! committed state at the time of the call. The planner uses a value or
//! full-text index when one applies and re-checks the full predicate either
//! way, so indexed and unindexed execution return the same rows.

mod expr;
mod live;
mod plan;

pub use expr::Expr;
pub use live::QueryChange;

use crate::changes::ListenerToken;
use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::store::now_millis;
use crate::value::Value;
use expr::{compare_values, FtsHits};
use plan::{choose_plan, Plan};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Bound;

/// One result row: a document id and its (possibly projected) body.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: String,
    body: Value,
}

impl Row {
    /// Document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Row body. With a projection, only the selected paths are present.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Value at a dotted path in the row body.
    pub fn at_path(&self, path: &str) -> Option<&Value> {
        self.body.at_path(path)
    }
}

/// Materialized query results in result order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    /// Rows in result order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Document ids in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.id.as_str()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows matched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
struct OrderBy {
    path: String,
    descending: bool,
}

/// A query over one collection.
#[derive(Clone)]
pub struct Query {
    collection: Collection,
    filter: Expr,
    order_by: Vec<OrderBy>,
    projection: Option<Vec<String>>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    pub(crate) fn new(collection: Collection, filter: Expr) -> Self {
        Self {
            collection,
            filter,
            order_by: Vec::new(),
            projection: None,
            limit: None,
            offset: 0,
        }
    }

    /// Orders results ascending by the value at `path`. Repeated calls add
    /// secondary keys. Missing values sort before present ones.
    pub fn order_by(mut self, path: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            path: path.into(),
            descending: false,
        });
        self
    }

    /// Orders results descending by the value at `path`.
    pub fn order_by_desc(mut self, path: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            path: path.into(),
            descending: true,
        });
        self
    }

    /// Restricts row bodies to the given dotted paths.
    pub fn select<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` rows after ordering.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Runs the query against current committed state.
    pub fn execute(&self) -> Result<ResultSet> {
        let state = self.collection.state()?;
        let now = now_millis();
        let hits = self.resolve_fts()?;
        let plan = self.plan();

        // Candidate (id, body) pairs; the filter re-checks each one.
        let candidates: Vec<(String, Value)> = match &plan {
            Plan::FullScan => state.live_docs(now),
            Plan::IndexEq { path, value } => {
                match self
                    .collection
                    .inner
                    .indexes
                    .lookup_eq(self.collection.id, path, value)
                {
                    Some(ids) => fetch_live(&state, ids, now),
                    None => state.live_docs(now),
                }
            }
            Plan::IndexRange { path, lower, upper } => {
                match self.collection.inner.indexes.lookup_range(
                    self.collection.id,
                    path,
                    as_value_bound(lower),
                    as_value_bound(upper),
                ) {
                    Some(ids) => fetch_live(&state, ids, now),
                    None => state.live_docs(now),
                }
            }
            Plan::FullText { index, text } => {
                let ids = hits
                    .get(index, text)
                    .map(|set| {
                        let mut ids: Vec<String> = set.iter().cloned().collect();
                        ids.sort();
                        ids
                    })
                    .unwrap_or_default();
                fetch_live(&state, ids, now)
            }
        };

        let mut rows = Vec::new();
        for (id, body) in candidates {
            if self.filter.eval(&id, &body, &hits)? {
                rows.push(Row { id, body });
            }
        }

        if !self.order_by.is_empty() {
            let keys = self.order_by.clone();
            rows.sort_by(|a, b| {
                for key in &keys {
                    let ord = cmp_order_key(
                        a.body.at_path(&key.path),
                        b.body.at_path(&key.path),
                    );
                    let ord = if key.descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.id.cmp(&b.id)
            });
        }

        let mut rows: Vec<Row> = rows.into_iter().skip(self.offset).collect();
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        if let Some(paths) = &self.projection {
            for row in &mut rows {
                row.body = project(&row.body, paths);
            }
        }
        Ok(ResultSet { rows })
    }

    /// Describes the access path the planner would choose, without running
    /// the query.
    pub fn explain(&self) -> Result<String> {
        self.collection.state()?;
        Ok(format!(
            "{} ({})",
            self.plan().describe(),
            self.collection.qualified_name()
        ))
    }

    /// Registers a live-query listener.
    ///
    /// The current results are executed and delivered before this returns.
    /// Afterwards, every commit batch in the collection triggers a
    /// re-evaluation; the listener is called only when results differ from
    /// the last delivery. Re-evaluation failures arrive as error changes on
    /// the same callback; deleting the collection delivers one terminal
    /// error. Remove with [`Collection::remove_listener`].
    pub fn add_listener(
        &self,
        listener: impl Fn(QueryChange) + Send + Sync + 'static,
    ) -> Result<ListenerToken> {
        live::attach(self.clone(), Box::new(listener))
    }

    fn plan(&self) -> Plan {
        let collection = &self.collection;
        choose_plan(&self.filter, &|path| collection.has_value_index_on(path))
    }

    /// Runs every full-text match in the filter up front, failing when a
    /// named index does not exist or is not a full-text index.
    fn resolve_fts(&self) -> Result<FtsHits> {
        let mut matches = Vec::new();
        self.filter.collect_matches(&mut matches);
        let mut hits = FtsHits::default();
        for (index, text) in matches {
            let ids = self
                .collection
                .inner
                .indexes
                .fts_search(self.collection.id, &index, &text)
                .ok_or_else(|| Error::IndexNotFound {
                    collection: self.collection.qualified_name(),
                    name: index.clone(),
                })?;
            hits.insert(index, text, ids.into_iter().collect::<HashSet<_>>());
        }
        Ok(hits)
    }

    pub(crate) fn collection(&self) -> &Collection {
        &self.collection
    }
}

fn fetch_live(
    state: &crate::store::CollectionState,
    ids: Vec<String>,
    now: u64,
) -> Vec<(String, Value)> {
    ids.into_iter()
        .filter_map(|id| {
            let record = state.record(&id)?;
            if !record.is_live_at(now) {
                return None;
            }
            record.body.map(|body| (id, body))
        })
        .collect()
}

fn as_value_bound(bound: &Bound<Value>) -> Bound<&Value> {
    match bound {
        Bound::Included(v) => Bound::Included(v),
        Bound::Excluded(v) => Bound::Excluded(v),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Ordering for sort keys: missing sorts first, incomparable types group by
/// a coarse type rank so the ordering stays total.
fn cmp_order_key(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
        Value::Blob(_) => 6,
    }
}

/// Builds a projected body containing only the selected paths, keyed by the
/// path text.
fn project(body: &Value, paths: &[String]) -> Value {
    let mut out = std::collections::BTreeMap::new();
    for path in paths {
        if let Some(value) = body.at_path(path) {
            out.insert(path.clone(), value.clone());
        }
    }
    Value::Object(out)
}
