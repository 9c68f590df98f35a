//! Secondary indexes: value indexes and full-text indexes.
//!
//! Index definitions live in the manifest; the in-memory structures here are
//! rebuilt from the document store on open and kept current synchronously by
//! the write path, so a query issued immediately after a commit sees the
//! committed data.

mod fts;
mod key;
mod value_index;

use crate::error::{Error, Result};
use crate::types::CollectionId;
use crate::value::Value;
use fts::FtsIndex;
use key::encode_component;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Bound;
use value_index::ValueIndex;

/// Definition of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexSpec {
    /// Ordered index over the given property paths.
    Value {
        /// Property paths forming the composite key, leading path first.
        paths: Vec<String>,
    },
    /// Token-based full-text index over the given string property paths.
    FullText {
        /// Property paths whose string values are tokenized.
        paths: Vec<String>,
        /// Fold common Latin diacritics before matching.
        ignore_accents: bool,
    },
}

impl IndexSpec {
    /// Creates a value index spec over the given property paths.
    pub fn value<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Value {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a full-text index spec over the given property paths.
    pub fn full_text<I, S>(paths: I, ignore_accents: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::FullText {
            paths: paths.into_iter().map(Into::into).collect(),
            ignore_accents,
        }
    }

    /// The property paths this index covers.
    pub fn paths(&self) -> &[String] {
        match self {
            Self::Value { paths } | Self::FullText { paths, .. } => paths,
        }
    }

    /// Whether this is a full-text index.
    pub fn is_full_text(&self) -> bool {
        matches!(self, Self::FullText { .. })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let paths = self.paths();
        if paths.is_empty() {
            return Err(Error::invalid_argument(
                "index must cover at least one property path",
            ));
        }
        if paths.iter().any(|p| p.is_empty()) {
            return Err(Error::invalid_argument("index property path is empty"));
        }
        Ok(())
    }
}

enum AnyIndex {
    Value(ValueIndex),
    FullText(FtsIndex),
}

impl AnyIndex {
    fn from_spec(spec: &IndexSpec) -> Self {
        match spec {
            IndexSpec::Value { paths } => Self::Value(ValueIndex::new(paths.clone())),
            IndexSpec::FullText {
                paths,
                ignore_accents,
            } => Self::FullText(FtsIndex::new(paths.clone(), *ignore_accents)),
        }
    }

    fn update(&mut self, doc_id: &str, body: Option<&Value>) {
        match self {
            Self::Value(ix) => ix.update(doc_id, body),
            Self::FullText(ix) => ix.update(doc_id, body),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Value(ix) => ix.len(),
            Self::FullText(ix) => ix.len(),
        }
    }
}

#[derive(Default)]
struct CollectionIndexes {
    indexes: HashMap<String, AnyIndex>,
}

/// Holds the in-memory index structures for every open collection.
pub(crate) struct IndexManager {
    collections: RwLock<HashMap<CollectionId, CollectionIndexes>>,
}

impl IndexManager {
    pub(crate) fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a collection so writes against it can be indexed.
    pub(crate) fn ensure_collection(&self, id: CollectionId) {
        self.collections.write().entry(id).or_default();
    }

    /// Drops every index structure for a collection.
    pub(crate) fn drop_collection(&self, id: CollectionId) {
        self.collections.write().remove(&id);
    }

    /// Adds an index and populates it from the given documents.
    pub(crate) fn add_index<'a>(
        &self,
        id: CollectionId,
        name: &str,
        spec: &IndexSpec,
        docs: impl Iterator<Item = (&'a str, &'a Value)>,
    ) {
        let mut index = AnyIndex::from_spec(spec);
        for (doc_id, body) in docs {
            index.update(doc_id, Some(body));
        }
        tracing::debug!(collection = %id, index = name, entries = index.len(), "built index");
        let mut map = self.collections.write();
        map.entry(id)
            .or_default()
            .indexes
            .insert(name.to_string(), index);
    }

    /// Removes an index. Missing indexes are ignored here; the catalog
    /// decides whether that is an error.
    pub(crate) fn remove_index(&self, id: CollectionId, name: &str) {
        if let Some(coll) = self.collections.write().get_mut(&id) {
            coll.indexes.remove(name);
        }
    }

    /// Applies one document write to every index of the collection.
    /// `None` body removes the document from the indexes.
    pub(crate) fn apply_write(&self, id: CollectionId, doc_id: &str, body: Option<&Value>) {
        if let Some(coll) = self.collections.write().get_mut(&id) {
            for index in coll.indexes.values_mut() {
                index.update(doc_id, body);
            }
        }
    }

    /// Looks up ids whose leading indexed component equals `value`, using
    /// any value index led by `path`. Returns `None` when no such index
    /// exists and the caller must fall back to a scan.
    pub(crate) fn lookup_eq(
        &self,
        id: CollectionId,
        path: &str,
        value: &Value,
    ) -> Option<Vec<String>> {
        let map = self.collections.read();
        let coll = map.get(&id)?;
        let component = encode_component(Some(value));
        coll.indexes.values().find_map(|index| match index {
            AnyIndex::Value(ix) if ix.leading_path() == path => Some(ix.ids_eq(&component)),
            _ => None,
        })
    }

    /// Range lookup on the leading component of a value index led by `path`.
    pub(crate) fn lookup_range(
        &self,
        id: CollectionId,
        path: &str,
        lower: Bound<&Value>,
        upper: Bound<&Value>,
    ) -> Option<Vec<String>> {
        let map = self.collections.read();
        let coll = map.get(&id)?;
        let lo = encode_bound(lower);
        let hi = encode_bound(upper);
        coll.indexes.values().find_map(|index| match index {
            AnyIndex::Value(ix) if ix.leading_path() == path => {
                Some(ix.ids_in_range(as_ref_bound(&lo), as_ref_bound(&hi)))
            }
            _ => None,
        })
    }

    /// Runs a full-text search against the named index.
    pub(crate) fn fts_search(
        &self,
        id: CollectionId,
        index_name: &str,
        query: &str,
    ) -> Option<Vec<String>> {
        let map = self.collections.read();
        let coll = map.get(&id)?;
        match coll.indexes.get(index_name)? {
            AnyIndex::FullText(ix) => Some(ix.search(query)),
            AnyIndex::Value(_) => None,
        }
    }
}

fn encode_bound(bound: Bound<&Value>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(v) => Bound::Included(encode_component(Some(v))),
        Bound::Excluded(v) => Bound::Excluded(encode_component(Some(v))),
        Bound::Unbounded => Bound::Unbounded,
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
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

    #[test]
    fn spec_validation() {
        assert!(IndexSpec::value(["name"]).validate().is_ok());
        assert!(IndexSpec::value(Vec::<String>::new()).validate().is_err());
        assert!(IndexSpec::value([""]).validate().is_err());
    }

    #[test]
    fn manager_applies_writes_to_all_indexes() {
        let mgr = IndexManager::new();
        let id = CollectionId::new(1);
        mgr.ensure_collection(id);
        mgr.add_index(id, "by-age", &IndexSpec::value(["age"]), std::iter::empty());
        mgr.add_index(
            id,
            "by-text",
            &IndexSpec::full_text(["bio"], false),
            std::iter::empty(),
        );

        let doc = body(&[("age", Value::Int(30)), ("bio", Value::from("rust fan"))]);
        mgr.apply_write(id, "d1", Some(&doc));

        assert_eq!(
            mgr.lookup_eq(id, "age", &Value::Int(30)),
            Some(vec!["d1".to_string()])
        );
        assert_eq!(
            mgr.fts_search(id, "by-text", "rust"),
            Some(vec!["d1".to_string()])
        );

        mgr.apply_write(id, "d1", None);
        assert_eq!(mgr.lookup_eq(id, "age", &Value::Int(30)), Some(vec![]));
    }

    #[test]
    fn add_index_backfills_existing_docs() {
        let mgr = IndexManager::new();
        let id = CollectionId::new(2);
        mgr.ensure_collection(id);

        let d1 = body(&[("age", Value::Int(5))]);
        let docs = vec![("d1", &d1)];
        mgr.add_index(id, "by-age", &IndexSpec::value(["age"]), docs.into_iter());

        assert_eq!(
            mgr.lookup_eq(id, "age", &Value::Int(5)),
            Some(vec!["d1".to_string()])
        );
    }

    #[test]
    fn lookup_without_matching_index_is_none() {
        let mgr = IndexManager::new();
        let id = CollectionId::new(3);
        mgr.ensure_collection(id);
        assert_eq!(mgr.lookup_eq(id, "age", &Value::Int(1)), None);
        assert_eq!(mgr.fts_search(id, "nope", "x"), None);
    }

    #[test]
    fn range_lookup_through_manager() {
        let mgr = IndexManager::new();
        let id = CollectionId::new(4);
        mgr.ensure_collection(id);
        mgr.add_index(id, "by-age", &IndexSpec::value(["age"]), std::iter::empty());
        for (doc, age) in [("a", 1), ("b", 2), ("c", 3)] {
            mgr.apply_write(id, doc, Some(&body(&[("age", Value::Int(age))])));
        }
        let ids = mgr
            .lookup_range(
                id,
                "age",
                Bound::Included(&Value::Int(2)),
                Bound::Unbounded,
            )
            .unwrap();
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
    }
}
