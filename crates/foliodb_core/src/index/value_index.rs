//! Value index: ordered composite keys over property paths.

use crate::index::key::encode_component;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// A secondary index over one or more property paths.
///
/// Entries map composite keys (one encoded component per path) to the set of
/// document ids holding those values. Equality and range lookups operate on
/// the leading path; queries re-check the full predicate afterwards, so the
/// index only has to be a superset filter.
pub(crate) struct ValueIndex {
    paths: Vec<String>,
    entries: BTreeMap<Vec<Vec<u8>>, BTreeSet<String>>,
    forward: HashMap<String, Vec<Vec<u8>>>,
}

impl ValueIndex {
    pub(crate) fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            entries: BTreeMap::new(),
            forward: HashMap::new(),
        }
    }

    /// Returns the leading indexed path.
    pub(crate) fn leading_path(&self) -> &str {
        &self.paths[0]
    }

    /// Updates the index for a document write; `None` removes the entry.
    pub(crate) fn update(&mut self, doc_id: &str, body: Option<&Value>) {
        if let Some(old_key) = self.forward.remove(doc_id) {
            if let Some(ids) = self.entries.get_mut(&old_key) {
                ids.remove(doc_id);
                if ids.is_empty() {
                    self.entries.remove(&old_key);
                }
            }
        }

        let Some(body) = body else { return };
        let key: Vec<Vec<u8>> = self
            .paths
            .iter()
            .map(|path| encode_component(body.at_path(path)))
            .collect();
        self.entries
            .entry(key.clone())
            .or_default()
            .insert(doc_id.to_string());
        self.forward.insert(doc_id.to_string(), key);
    }

    /// Document ids whose leading component equals `component`.
    pub(crate) fn ids_eq(&self, component: &[u8]) -> Vec<String> {
        self.ids_in_range(Bound::Included(component), Bound::Included(component))
    }

    /// Document ids whose leading component falls within the bounds,
    /// in index (key) order.
    pub(crate) fn ids_in_range(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> Vec<String> {
        let start: Bound<Vec<Vec<u8>>> = match lower {
            Bound::Included(b) | Bound::Excluded(b) => Bound::Included(vec![b.to_vec()]),
            Bound::Unbounded => Bound::Unbounded,
        };

        let mut out = Vec::new();
        for (key, ids) in self.entries.range((start, Bound::Unbounded)) {
            let leading: &[u8] = &key[0];
            let below = match lower {
                Bound::Included(b) => leading < b,
                Bound::Excluded(b) => leading <= b,
                Bound::Unbounded => false,
            };
            if below {
                continue;
            }
            let beyond = match upper {
                Bound::Included(b) => leading > b,
                Bound::Excluded(b) => leading >= b,
                Bound::Unbounded => false,
            };
            if beyond {
                break;
            }
            out.extend(ids.iter().cloned());
        }
        out
    }

    /// Total number of indexed documents.
    pub(crate) fn len(&self) -> usize {
        self.forward.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn body(pairs: &[(&str, Value)]) -> Value {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Object(m)
    }

    fn k(v: &Value) -> Vec<u8> {
        encode_component(Some(v))
    }

    #[test]
    fn equality_lookup() {
        let mut ix = ValueIndex::new(vec!["age".into()]);
        ix.update("d1", Some(&body(&[("age", Value::Int(30))])));
        ix.update("d2", Some(&body(&[("age", Value::Int(40))])));
        ix.update("d3", Some(&body(&[("age", Value::Int(30))])));

        let ids = ix.ids_eq(&k(&Value::Int(30)));
        assert_eq!(ids, vec!["d1".to_string(), "d3".to_string()]);
        assert_eq!(ix.len(), 3);
    }

    #[test]
    fn range_lookup() {
        let mut ix = ValueIndex::new(vec!["age".into()]);
        for (id, age) in [("a", 10), ("b", 20), ("c", 30), ("d", 40)] {
            ix.update(id, Some(&body(&[("age", Value::Int(age))])));
        }

        let ids = ix.ids_in_range(
            Bound::Excluded(k(&Value::Int(10)).as_slice()),
            Bound::Included(k(&Value::Int(30)).as_slice()),
        );
        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);

        let all = ix.ids_in_range(Bound::Unbounded, Bound::Unbounded);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn update_moves_entry() {
        let mut ix = ValueIndex::new(vec!["age".into()]);
        ix.update("d1", Some(&body(&[("age", Value::Int(30))])));
        ix.update("d1", Some(&body(&[("age", Value::Int(31))])));

        assert!(ix.ids_eq(&k(&Value::Int(30))).is_empty());
        assert_eq!(ix.ids_eq(&k(&Value::Int(31))), vec!["d1".to_string()]);
        assert_eq!(ix.len(), 1);
    }

    #[test]
    fn removal() {
        let mut ix = ValueIndex::new(vec!["age".into()]);
        ix.update("d1", Some(&body(&[("age", Value::Int(30))])));
        ix.update("d1", None);
        assert!(ix.ids_eq(&k(&Value::Int(30))).is_empty());
        assert_eq!(ix.len(), 0);
    }

    #[test]
    fn missing_values_are_indexed() {
        let mut ix = ValueIndex::new(vec!["age".into()]);
        ix.update("d1", Some(&body(&[("name", Value::from("x"))])));
        let ids = ix.ids_eq(&encode_component(None));
        assert_eq!(ids, vec!["d1".to_string()]);
    }

    #[test]
    fn composite_keys_group_by_leading() {
        let mut ix = ValueIndex::new(vec!["city".into(), "age".into()]);
        ix.update(
            "d1",
            Some(&body(&[("city", Value::from("Oslo")), ("age", Value::Int(1))])),
        );
        ix.update(
            "d2",
            Some(&body(&[("city", Value::from("Oslo")), ("age", Value::Int(2))])),
        );
        ix.update(
            "d3",
            Some(&body(&[("city", Value::from("Riga")), ("age", Value::Int(1))])),
        );

        let oslo = ix.ids_eq(&k(&Value::from("Oslo")));
        assert_eq!(oslo, vec!["d1".to_string(), "d2".to_string()]);
    }
}
