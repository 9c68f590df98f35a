//! Collection handles and the document write path.
//!
//! A [`Collection`] is a cheap clone-able handle naming one collection in an
//! open database. All writes funnel through [`Collection::save_document_with`]
//! and friends, which serialize on the per-collection write lock and follow a
//! fixed commit order: conflict check, revision assignment, log append, index
//! update, in-memory apply, change publication. The sequence counter advances
//! only after the log append succeeds, so failed writes leave no gaps.

use crate::blob::Blob;
use crate::changes::{BusEvent, CollectionChange, DocumentChange, ListenerToken};
use crate::database::DbInner;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::index::IndexSpec;
use crate::log::LogRecord;
use crate::query::{Expr, Query};
use crate::store::{now_millis, CollectionState, DocRecord};
use crate::types::{CollectionId, ConcurrencyControl, Revision, SequenceNumber};
use crate::value::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Handle to one collection of an open database.
#[derive(Clone)]
pub struct Collection {
    pub(crate) inner: Arc<DbInner>,
    pub(crate) id: CollectionId,
    pub(crate) scope: String,
    pub(crate) name: String,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl Collection {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope name.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Qualified `scope.collection` name.
    pub fn qualified_name(&self) -> String {
        crate::catalog::qualified_name(&self.scope, &self.name)
    }

    pub(crate) fn state(&self) -> Result<Arc<CollectionState>> {
        self.inner.ensure_open()?;
        self.inner
            .store
            .collection(self.id)
            .ok_or_else(|| Error::CollectionNotFound {
                scope: self.scope.clone(),
                name: self.name.clone(),
            })
    }

    /// Number of live (not deleted, not expired) documents.
    pub fn count(&self) -> Result<u64> {
        Ok(self.state()?.live_count(now_millis()))
    }

    /// Fetches a document. Deleted, purged, and expired documents read as
    /// `None`.
    pub fn document(&self, id: &str) -> Result<Option<Document>> {
        let state = self.state()?;
        let Some(record) = state.record(id) else {
            return Ok(None);
        };
        if !record.is_live_at(now_millis()) {
            return Ok(None);
        }
        let Some(Value::Object(body)) = record.body else {
            return Ok(None);
        };
        Ok(Some(Document::from_stored(
            id.to_string(),
            body,
            record.revision,
            record.sequence,
        )))
    }

    /// Highest committed sequence in this collection.
    pub fn last_sequence(&self) -> Result<SequenceNumber> {
        Ok(self.state()?.last_sequence())
    }

    /// Saves a document with last-write-wins semantics.
    pub fn save_document(&self, doc: &mut Document) -> Result<()> {
        self.save_document_with(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Saves a document under the given concurrency control.
    ///
    /// With [`ConcurrencyControl::FailOnConflict`] the save fails with
    /// [`Error::Conflict`] when the document's base revision is not the
    /// current stored revision. A tombstone does not conflict: a deleted
    /// document may be recreated, and its revision lineage continues.
    pub fn save_document_with(
        &self,
        doc: &mut Document,
        concurrency: ConcurrencyControl,
    ) -> Result<()> {
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        let current = state.record(doc.id());

        let base = match (&current, doc.revision()) {
            (Some(cur), Some(rev)) => {
                if concurrency == ConcurrencyControl::FailOnConflict
                    && cur.body.is_some()
                    && cur.revision != *rev
                {
                    return Err(Error::conflict(self.qualified_name(), doc.id()));
                }
                Some(cur.revision.clone())
            }
            (Some(cur), None) => {
                if concurrency == ConcurrencyControl::FailOnConflict && cur.body.is_some() {
                    return Err(Error::conflict(self.qualified_name(), doc.id()));
                }
                Some(cur.revision.clone())
            }
            (None, base) => base.cloned(),
        };
        let revision = match base {
            Some(prev) => Revision::next(&prev),
            None => Revision::first(),
        };
        let sequence = state.peek_next_seq();
        let expiration = current.as_ref().and_then(|c| c.expiration);
        let body = doc.to_value();

        // Blob content first, so a body referencing it never lands alone.
        let pending: Vec<(String, Vec<u8>)> = doc.pending_blobs.drain().collect();
        for (digest, content) in &pending {
            if !self.inner.store.has_blob(digest) {
                self.inner.log.append(&LogRecord::BlobPut {
                    digest: digest.clone(),
                    content: content.clone(),
                })?;
            }
        }
        self.inner.log.append(&LogRecord::Save {
            collection: self.id,
            id: doc.id().to_string(),
            revision: revision.clone(),
            sequence,
            expiration,
            body: body.clone(),
        })?;
        self.inner.commit_log()?;

        for (digest, content) in pending {
            self.inner.store.put_blob(digest, content);
        }
        self.inner.indexes.apply_write(self.id, doc.id(), Some(&body));
        state.insert(
            doc.id().to_string(),
            DocRecord {
                revision: revision.clone(),
                sequence,
                body: Some(body),
                expiration,
            },
        );
        state.commit_seq(sequence);
        doc.set_committed(revision, sequence);
        tracing::debug!(
            collection = %self.qualified_name(),
            id = doc.id(),
            sequence = sequence.as_u64(),
            "saved document"
        );
        self.inner
            .bus
            .publish_commit(self.id, &self.qualified_name(), doc.id(), sequence);
        Ok(())
    }

    /// Deletes a document with last-write-wins semantics, leaving a
    /// tombstone.
    pub fn delete_document(&self, doc: &Document) -> Result<()> {
        self.delete_document_with(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Deletes a document under the given concurrency control.
    pub fn delete_document_with(
        &self,
        doc: &Document,
        concurrency: ConcurrencyControl,
    ) -> Result<()> {
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        let current = state
            .record(doc.id())
            .filter(|c| c.body.is_some())
            .ok_or_else(|| Error::document_not_found(self.qualified_name(), doc.id()))?;
        if concurrency == ConcurrencyControl::FailOnConflict
            && doc.revision() != Some(&current.revision)
        {
            return Err(Error::conflict(self.qualified_name(), doc.id()));
        }

        let revision = Revision::next(&current.revision);
        let sequence = state.peek_next_seq();
        self.inner.log.append(&LogRecord::Delete {
            collection: self.id,
            id: doc.id().to_string(),
            revision: revision.clone(),
            sequence,
        })?;
        self.inner.commit_log()?;

        self.inner.indexes.apply_write(self.id, doc.id(), None);
        state.insert(
            doc.id().to_string(),
            DocRecord {
                revision,
                sequence,
                body: None,
                expiration: None,
            },
        );
        state.commit_seq(sequence);
        tracing::debug!(
            collection = %self.qualified_name(),
            id = doc.id(),
            "deleted document"
        );
        self.inner
            .bus
            .publish_commit(self.id, &self.qualified_name(), doc.id(), sequence);
        Ok(())
    }

    /// Removes a document and its tombstone entirely. Unlike delete, purge
    /// is unconditional and leaves no trace; it cannot be replicated or
    /// observed through revisions afterwards.
    pub fn purge_document(&self, doc: &Document) -> Result<()> {
        self.purge_document_by_id(doc.id())
    }

    /// Purges by id.
    pub fn purge_document_by_id(&self, id: &str) -> Result<()> {
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        if state.record(id).is_none() {
            return Err(Error::document_not_found(self.qualified_name(), id));
        }
        self.inner.log.append(&LogRecord::Purge {
            collection: self.id,
            id: id.to_string(),
        })?;
        self.inner.commit_log()?;

        self.inner.indexes.apply_write(self.id, id, None);
        state.remove(id);
        tracing::debug!(collection = %self.qualified_name(), id, "purged document");
        // Purge advances no sequence but is still observable.
        self.inner
            .bus
            .publish_commit(self.id, &self.qualified_name(), id, state.last_sequence());
        Ok(())
    }

    /// Sets or clears a document's expiration instant. Expired documents
    /// read as absent immediately and are purged by the background sweep.
    /// Changing expiration assigns no new revision or sequence.
    pub fn set_document_expiration(
        &self,
        id: &str,
        expiration: Option<SystemTime>,
    ) -> Result<()> {
        let millis = match expiration {
            Some(when) => Some(system_time_millis(when)?),
            None => None,
        };
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        let mut record = state
            .record(id)
            .filter(|c| c.body.is_some())
            .ok_or_else(|| Error::document_not_found(self.qualified_name(), id))?;
        self.inner.log.append(&LogRecord::SetExpiration {
            collection: self.id,
            id: id.to_string(),
            expiration: millis,
        })?;
        self.inner.commit_log()?;
        record.expiration = millis;
        state.insert(id.to_string(), record);
        Ok(())
    }

    /// Reads a document's expiration instant.
    pub fn document_expiration(&self, id: &str) -> Result<Option<SystemTime>> {
        let state = self.state()?;
        let record = state
            .record(id)
            .filter(|c| c.body.is_some())
            .ok_or_else(|| Error::document_not_found(self.qualified_name(), id))?;
        Ok(record
            .expiration
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms)))
    }

    /// Registers a listener for committed changes in this collection.
    /// Events carry the ids changed since the previous delivery, batched.
    pub fn add_change_listener(
        &self,
        listener: impl Fn(CollectionChange) + Send + Sync + 'static,
    ) -> Result<ListenerToken> {
        self.inner.ensure_open()?;
        Ok(self.inner.bus.add_listener(
            self.id,
            None,
            Box::new(move |name, event| {
                if let BusEvent::Changes(doc_ids) = event {
                    listener(CollectionChange {
                        collection: name.to_string(),
                        doc_ids,
                    });
                }
            }),
        ))
    }

    /// Registers a listener for committed changes to one document.
    pub fn add_document_change_listener(
        &self,
        id: impl Into<String>,
        listener: impl Fn(DocumentChange) + Send + Sync + 'static,
    ) -> Result<ListenerToken> {
        self.inner.ensure_open()?;
        Ok(self.inner.bus.add_listener(
            self.id,
            Some(id.into()),
            Box::new(move |name, event| {
                if let BusEvent::Changes(doc_ids) = event {
                    for doc_id in doc_ids {
                        listener(DocumentChange {
                            collection: name.to_string(),
                            doc_id,
                        });
                    }
                }
            }),
        ))
    }

    /// Removes a listener. No deliveries happen after this returns; an
    /// in-flight callback completes first. Unknown tokens are ignored.
    pub fn remove_listener(&self, token: ListenerToken) {
        self.inner.bus.remove_listener(token);
    }

    /// Creates a secondary index. Fails with [`Error::IndexAlreadyExists`]
    /// for a duplicate name. The index is persisted in the manifest and
    /// populated from current documents before this returns.
    pub fn create_index(&self, name: &str, spec: IndexSpec) -> Result<()> {
        crate::catalog::validate_name("index", name)?;
        spec.validate()?;
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        {
            let mut manifest = self.inner.manifest.write();
            let meta = manifest
                .collection_mut(&self.scope, &self.name)
                .ok_or_else(|| Error::CollectionNotFound {
                    scope: self.scope.clone(),
                    name: self.name.clone(),
                })?;
            if meta.indexes.contains_key(name) {
                return Err(Error::IndexAlreadyExists {
                    collection: self.qualified_name(),
                    name: name.to_string(),
                });
            }
            meta.indexes.insert(name.to_string(), spec.clone());
        }
        self.inner.save_manifest()?;
        let docs = state.live_docs(now_millis());
        self.inner.indexes.add_index(
            self.id,
            name,
            &spec,
            docs.iter().map(|(id, body)| (id.as_str(), body)),
        );
        tracing::info!(collection = %self.qualified_name(), index = name, "created index");
        Ok(())
    }

    /// Deletes a secondary index.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        let _gate = self.inner.write_gate.read();
        let state = self.state()?;
        let _write = state.write_lock.lock();
        {
            let mut manifest = self.inner.manifest.write();
            let meta = manifest
                .collection_mut(&self.scope, &self.name)
                .ok_or_else(|| Error::CollectionNotFound {
                    scope: self.scope.clone(),
                    name: self.name.clone(),
                })?;
            if meta.indexes.remove(name).is_none() {
                return Err(Error::IndexNotFound {
                    collection: self.qualified_name(),
                    name: name.to_string(),
                });
            }
        }
        self.inner.save_manifest()?;
        self.inner.indexes.remove_index(self.id, name);
        Ok(())
    }

    /// Names of the collection's indexes.
    pub fn index_names(&self) -> Result<Vec<String>> {
        self.inner.ensure_open()?;
        let manifest = self.inner.manifest.read();
        let meta = manifest
            .collection(&self.scope, &self.name)
            .ok_or_else(|| Error::CollectionNotFound {
                scope: self.scope.clone(),
                name: self.name.clone(),
            })?;
        Ok(meta.indexes.keys().cloned().collect())
    }

    /// Starts a query over this collection with the given filter.
    pub fn query(&self, filter: Expr) -> Query {
        Query::new(self.clone(), filter)
    }

    /// Fetches blob content for a reference stored in this database.
    pub fn blob(&self, reference: &crate::blob::BlobRef) -> Result<Option<Blob>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .store
            .blob(&reference.digest)
            .map(|content| Blob::from_parts(reference.clone(), content)))
    }

    /// True when a value index led by `path` exists, for query planning.
    pub(crate) fn has_value_index_on(&self, path: &str) -> bool {
        let manifest = self.inner.manifest.read();
        manifest
            .collection(&self.scope, &self.name)
            .map(|meta| {
                meta.indexes.values().any(|spec| {
                    !spec.is_full_text() && spec.paths().first().map(String::as_str) == Some(path)
                })
            })
            .unwrap_or(false)
    }
}

fn system_time_millis(when: SystemTime) -> Result<u64> {
    when.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| Error::invalid_argument("expiration predates the unix epoch"))
}
