//! In-memory document store state.
//!
//! Durable state is the commit log; this module holds the materialized view
//! of it: per-collection document maps plus the shared blob store. Mutations
//! here are primitives invoked by the collection write path, which is
//! responsible for ordering (conflict check, log append, index update,
//! map update, event publish) under the per-collection write lock.

use crate::types::{CollectionId, Revision, SequenceNumber};
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One stored document version. `body: None` marks a tombstone: the id is
/// known, a deletion was recorded, but the document is not readable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DocRecord {
    pub revision: Revision,
    pub sequence: SequenceNumber,
    pub body: Option<Value>,
    /// Expiration instant in milliseconds since epoch.
    pub expiration: Option<u64>,
}

impl DocRecord {
    /// True when the record carries a readable body that has not expired.
    pub(crate) fn is_live_at(&self, now: u64) -> bool {
        self.body.is_some() && self.expiration.map_or(true, |at| at > now)
    }
}

/// Mutable state of one collection.
pub(crate) struct CollectionState {
    /// Serializes the write path for this collection.
    pub(crate) write_lock: Mutex<()>,
    docs: RwLock<BTreeMap<String, DocRecord>>,
    last_seq: AtomicU64,
}

impl CollectionState {
    fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            docs: RwLock::new(BTreeMap::new()),
            last_seq: AtomicU64::new(0),
        }
    }

    /// Current record for an id, tombstones included.
    pub(crate) fn record(&self, id: &str) -> Option<DocRecord> {
        self.docs.read().get(id).cloned()
    }

    /// The sequence the next committed write will take. Only meaningful
    /// while holding `write_lock`; the counter advances in `commit_seq`
    /// after the write is durable, so failed writes leave no gap.
    pub(crate) fn peek_next_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.last_seq.load(Ordering::Acquire) + 1)
    }

    /// Records that `seq` was committed.
    pub(crate) fn commit_seq(&self, seq: SequenceNumber) {
        self.last_seq.store(seq.as_u64(), Ordering::Release);
    }

    /// Highest committed sequence.
    pub(crate) fn last_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.last_seq.load(Ordering::Acquire))
    }

    pub(crate) fn insert(&self, id: String, record: DocRecord) {
        self.docs.write().insert(id, record);
    }

    /// Removes the record entirely (purge).
    pub(crate) fn remove(&self, id: &str) -> Option<DocRecord> {
        self.docs.write().remove(id)
    }

    /// Number of live, unexpired documents.
    pub(crate) fn live_count(&self, now: u64) -> u64 {
        self.docs
            .read()
            .values()
            .filter(|r| r.is_live_at(now))
            .count() as u64
    }

    /// Snapshot of live, unexpired documents in id order.
    pub(crate) fn live_docs(&self, now: u64) -> Vec<(String, Value)> {
        self.docs
            .read()
            .iter()
            .filter(|(_, r)| r.is_live_at(now))
            .filter_map(|(id, r)| r.body.clone().map(|b| (id.clone(), b)))
            .collect()
    }

    /// Snapshot of every record, tombstones included.
    pub(crate) fn all_records(&self) -> Vec<(String, DocRecord)> {
        self.docs
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    /// Ids of documents whose expiration has passed.
    pub(crate) fn expired_ids(&self, now: u64) -> Vec<String> {
        self.docs
            .read()
            .iter()
            .filter(|(_, r)| r.body.is_some() && r.expiration.is_some_and(|at| at <= now))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// All collection states plus the shared blob store.
pub(crate) struct Store {
    collections: RwLock<HashMap<CollectionId, Arc<CollectionState>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn ensure_collection(&self, id: CollectionId) -> Arc<CollectionState> {
        let mut map = self.collections.write();
        Arc::clone(map.entry(id).or_insert_with(|| Arc::new(CollectionState::new())))
    }

    pub(crate) fn collection(&self, id: CollectionId) -> Option<Arc<CollectionState>> {
        self.collections.read().get(&id).cloned()
    }

    pub(crate) fn drop_collection(&self, id: CollectionId) {
        self.collections.write().remove(&id);
    }

    pub(crate) fn put_blob(&self, digest: String, content: Vec<u8>) {
        self.blobs.write().insert(digest, content);
    }

    pub(crate) fn blob(&self, digest: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(digest).cloned()
    }

    pub(crate) fn has_blob(&self, digest: &str) -> bool {
        self.blobs.read().contains_key(digest)
    }

    /// Snapshot of all stored blobs.
    pub(crate) fn all_blobs(&self) -> Vec<(String, Vec<u8>)> {
        self.blobs
            .read()
            .iter()
            .map(|(d, c)| (d.clone(), c.clone()))
            .collect()
    }

    /// Drops blobs not referenced by any live document or tombstone body.
    /// Returns the number removed.
    pub(crate) fn sweep_blobs(&self) -> usize {
        let mut referenced = HashSet::new();
        for state in self.collections.read().values() {
            for (_, record) in state.all_records() {
                if let Some(body) = &record.body {
                    collect_blob_digests(body, &mut referenced);
                }
            }
        }
        let mut blobs = self.blobs.write();
        let before = blobs.len();
        blobs.retain(|digest, _| referenced.contains(digest));
        before - blobs.len()
    }
}

/// Walks a value tree collecting referenced blob digests.
pub(crate) fn collect_blob_digests(value: &Value, out: &mut HashSet<String>) {
    match value {
        Value::Blob(blob_ref) => {
            out.insert(blob_ref.digest.clone());
        }
        Value::Array(items) => {
            for item in items {
                collect_blob_digests(item, out);
            }
        }
        Value::Object(fields) => {
            for item in fields.values() {
                collect_blob_digests(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobRef;

    fn record(body: Option<Value>, seq: u64) -> DocRecord {
        DocRecord {
            revision: Revision::first(),
            sequence: SequenceNumber::new(seq),
            body,
            expiration: None,
        }
    }

    #[test]
    fn sequence_only_advances_on_commit() {
        let state = CollectionState::new();
        assert_eq!(state.peek_next_seq().as_u64(), 1);
        // Peeking again without a commit yields the same sequence.
        assert_eq!(state.peek_next_seq().as_u64(), 1);
        state.commit_seq(SequenceNumber::new(1));
        assert_eq!(state.peek_next_seq().as_u64(), 2);
        assert_eq!(state.last_sequence().as_u64(), 1);
    }

    #[test]
    fn tombstones_are_not_live() {
        let state = CollectionState::new();
        state.insert("a".into(), record(Some(Value::Null), 1));
        state.insert("b".into(), record(None, 2));
        let now = now_millis();
        assert_eq!(state.live_count(now), 1);
        assert_eq!(state.live_docs(now).len(), 1);
        assert_eq!(state.all_records().len(), 2);
    }

    #[test]
    fn expired_docs_are_not_live() {
        let state = CollectionState::new();
        let mut rec = record(Some(Value::Null), 1);
        rec.expiration = Some(1);
        state.insert("a".into(), rec);
        let now = now_millis();
        assert_eq!(state.live_count(now), 0);
        assert_eq!(state.expired_ids(now), vec!["a".to_string()]);
    }

    #[test]
    fn blob_sweep_keeps_referenced() {
        let store = Store::new();
        store.put_blob("sha256-aa".into(), vec![1]);
        store.put_blob("sha256-bb".into(), vec![2]);

        let state = store.ensure_collection(CollectionId::new(1));
        let mut body = std::collections::BTreeMap::new();
        body.insert(
            "photo".to_string(),
            Value::Blob(BlobRef {
                digest: "sha256-aa".to_string(),
                content_type: None,
                length: 1,
            }),
        );
        state.insert("d1".into(), record(Some(Value::Object(body)), 1));

        assert_eq!(store.sweep_blobs(), 1);
        assert!(store.has_blob("sha256-aa"));
        assert!(!store.has_blob("sha256-bb"));
    }
}
