//! Database session lifecycle.
//!
//! A [`Database`] owns one store: its directory lock, manifest, commit log,
//! in-memory document state, indexes, change bus, and expiration sweeper.
//! Handles are cheap clones; the session closes when [`Database::close`] is
//! called or the last handle drops.

use crate::catalog::{self, ScopeInfo, DEFAULT_COLLECTION, DEFAULT_SCOPE};
use crate::changes::ChangeBus;
use crate::collection::Collection;
use crate::config::DatabaseConfig;
use crate::dir::{self, StoreDir};
use crate::error::{Error, Result};
use crate::expiry::Sweeper;
use crate::index::IndexManager;
use crate::log::{LogManager, LogRecord};
use crate::manifest::Manifest;
use crate::store::{collect_blob_digests, now_millis, DocRecord, Store};
use crate::types::{CollectionId, MaintenanceType};
use foliodb_storage::{
    EncryptedBackend, EncryptionKey, FileBackend, InMemoryBackend, StorageBackend,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct DbInner {
    pub(crate) name: String,
    pub(crate) config: RwLock<DatabaseConfig>,
    /// On-disk location; `None` for in-memory databases.
    path: Option<PathBuf>,
    /// Held directory lock; taken on close to release it.
    dir: RwLock<Option<StoreDir>>,
    pub(crate) manifest: RwLock<Manifest>,
    pub(crate) log: LogManager,
    pub(crate) store: Store,
    pub(crate) indexes: IndexManager,
    pub(crate) bus: ChangeBus,
    /// Writers hold this shared; maintenance and rekey hold it exclusively.
    pub(crate) write_gate: RwLock<()>,
    maintenance: Mutex<()>,
    sweeper: Mutex<Option<Sweeper>>,
    open: AtomicBool,
}

impl DbInner {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::DatabaseClosed)
        }
    }

    /// Flushes the commit log, syncing when the configuration asks for it.
    pub(crate) fn commit_log(&self) -> Result<()> {
        self.log.flush()?;
        if self.config.read().sync_on_commit {
            self.log.sync()?;
        }
        Ok(())
    }

    /// Persists the manifest. In-memory databases keep it only in memory.
    pub(crate) fn save_manifest(&self) -> Result<()> {
        if let Some(dir) = self.dir.read().as_ref() {
            dir.save_manifest(&self.manifest.read())?;
        }
        Ok(())
    }

    /// Qualified names and ids of every collection in the manifest.
    pub(crate) fn all_collections(&self) -> Vec<(CollectionId, String, String)> {
        let manifest = self.manifest.read();
        let mut out = Vec::new();
        for scope in manifest.scope_names() {
            if let Some(names) = manifest.collection_names(&scope) {
                for name in names {
                    if let Some(meta) = manifest.collection(&scope, &name) {
                        out.push((meta.id, scope.clone(), name.clone()));
                    }
                }
            }
        }
        out
    }

    fn shutdown(&self) -> Result<()> {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        self.bus.close();
        self.log.flush()?;
        self.log.sync()?;
        self.dir.write().take();
        tracing::info!(database = %self.name, "closed database");
        Ok(())
    }
}

impl Drop for DbInner {
    fn drop(&mut self) {
        if self.open.swap(false, Ordering::AcqRel) {
            if let Err(err) = self.shutdown() {
                tracing::warn!(database = %self.name, %err, "error while closing database");
            }
        }
    }
}

/// An open document database.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DbInner>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .finish()
    }
}

impl Database {
    /// Opens (and if missing, creates) the named database under the
    /// configured directory.
    ///
    /// Fails with [`Error::DatabaseLocked`] when another session holds the
    /// store's lock. State is recovered from the commit log and indexes are
    /// rebuilt before this returns.
    pub fn open(name: &str, config: DatabaseConfig) -> Result<Self> {
        catalog::validate_name("database", name)?;
        let parent = match &config.directory {
            Some(dir) => dir.clone(),
            None => Self::default_directory(),
        };
        let path = dir::store_path(&parent, name);
        let store_dir = StoreDir::open(&path, config.create_if_missing)?;
        let created = store_dir.is_new_store();
        store_dir.discard_stale_staging()?;

        let manifest = match store_dir.load_manifest()? {
            Some(manifest) => manifest,
            None => {
                let manifest = Manifest::new(config.format_version);
                store_dir.save_manifest(&manifest)?;
                manifest
            }
        };

        let backend = open_log_backend(&store_dir.log_path(), config.encryption_key.clone())?;
        let log = LogManager::new(backend, config.sync_on_commit);
        let db = Self::finish_open(
            name.to_string(),
            config,
            Some(path),
            Some(store_dir),
            manifest,
            log,
        )?;
        tracing::info!(database = name, path = %db.inner.path.as_deref().unwrap_or(Path::new("")).display(), created, "opened database");
        Ok(db)
    }

    /// Opens a database that lives only in memory. Nothing is persisted;
    /// everything else behaves like a disk-backed database.
    pub fn open_in_memory(name: &str) -> Result<Self> {
        Self::open_in_memory_with(name, DatabaseConfig::default())
    }

    /// In-memory database with explicit configuration.
    pub fn open_in_memory_with(name: &str, config: DatabaseConfig) -> Result<Self> {
        catalog::validate_name("database", name)?;
        let manifest = Manifest::new(config.format_version);
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        let log = LogManager::new(backend, false);
        Self::finish_open(name.to_string(), config, None, None, manifest, log)
    }

    fn finish_open(
        name: String,
        config: DatabaseConfig,
        path: Option<PathBuf>,
        store_dir: Option<StoreDir>,
        manifest: Manifest,
        log: LogManager,
    ) -> Result<Self> {
        let store = Store::new();
        let indexes = IndexManager::new();
        let records = log.read_all()?;
        replay(&store, &manifest, &records);
        rebuild_indexes(&indexes, &store, &manifest);

        let sweep_interval = config.expiry_sweep_interval;
        let inner = Arc::new(DbInner {
            name,
            config: RwLock::new(config),
            path,
            dir: RwLock::new(store_dir),
            manifest: RwLock::new(manifest),
            log,
            store,
            indexes,
            bus: ChangeBus::new(),
            write_gate: RwLock::new(()),
            maintenance: Mutex::new(()),
            sweeper: Mutex::new(None),
            open: AtomicBool::new(true),
        });
        *inner.sweeper.lock() = Some(Sweeper::spawn(Arc::downgrade(&inner), sweep_interval));
        Ok(Self { inner })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// On-disk path of the store directory, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Platform data directory used when the configuration names none.
    pub fn default_directory() -> PathBuf {
        #[cfg(unix)]
        {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(".local/share/foliodb");
            }
        }
        #[cfg(windows)]
        {
            if let Some(appdata) = std::env::var_os("APPDATA") {
                return PathBuf::from(appdata).join("foliodb");
            }
        }
        std::env::temp_dir().join("foliodb")
    }

    /// Closes the session: drains pending change deliveries, flushes the
    /// log, and releases the directory lock. Closing an already-closed
    /// database is a no-op.
    pub fn close(&self) -> Result<()> {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.shutdown()
    }

    /// Closes the session and deletes the store from disk.
    pub fn delete(self) -> Result<()> {
        let path = self.inner.path.clone();
        self.close()?;
        if let Some(path) = path {
            dir::delete_store(&path)?;
        }
        Ok(())
    }

    /// Deletes a store by name without opening it. Missing stores are a
    /// no-op; a locked store fails with [`Error::DatabaseLocked`].
    pub fn delete_by_path(name: &str, directory: &Path) -> Result<()> {
        dir::delete_store(&dir::store_path(directory, name))
    }

    /// True when a store of this name exists under `directory`.
    pub fn exists(name: &str, directory: &Path) -> bool {
        dir::store_path(directory, name).is_dir()
    }

    /// Copies a store into a consistent new store named `new_name` under the
    /// configured directory. The source must not be open elsewhere.
    pub fn copy(source_path: &Path, new_name: &str, config: &DatabaseConfig) -> Result<()> {
        catalog::validate_name("database", new_name)?;
        let parent = match &config.directory {
            Some(dir) => dir.clone(),
            None => Self::default_directory(),
        };
        let target = dir::store_path(&parent, new_name);
        dir::copy_store(source_path, &target)
    }

    /// Names of all scopes.
    pub fn scope_names(&self) -> Result<Vec<String>> {
        self.inner.ensure_open()?;
        Ok(self.inner.manifest.read().scope_names())
    }

    /// Scopes with their collection names.
    pub fn scopes(&self) -> Result<Vec<ScopeInfo>> {
        self.inner.ensure_open()?;
        let manifest = self.inner.manifest.read();
        Ok(manifest
            .scope_names()
            .into_iter()
            .map(|name| {
                let collections = manifest.collection_names(&name).unwrap_or_default();
                ScopeInfo { name, collections }
            })
            .collect())
    }

    /// Collection names within a scope.
    pub fn collection_names(&self, scope: &str) -> Result<Vec<String>> {
        self.inner.ensure_open()?;
        self.inner
            .manifest
            .read()
            .collection_names(scope)
            .ok_or_else(|| Error::ScopeNotFound {
                name: scope.to_string(),
            })
    }

    /// The always-present `_default._default` collection.
    pub fn default_collection(&self) -> Result<Collection> {
        self.collection_in(DEFAULT_SCOPE, DEFAULT_COLLECTION)
    }

    /// Fetches a collection in the default scope.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        self.collection_in(DEFAULT_SCOPE, name)
    }

    /// Fetches a collection by scope and name.
    pub fn collection_in(&self, scope: &str, name: &str) -> Result<Collection> {
        self.inner.ensure_open()?;
        let manifest = self.inner.manifest.read();
        let meta = manifest
            .collection(scope, name)
            .ok_or_else(|| Error::CollectionNotFound {
                scope: scope.to_string(),
                name: name.to_string(),
            })?;
        Ok(Collection {
            inner: Arc::clone(&self.inner),
            id: meta.id,
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }

    /// Creates a collection in the default scope.
    pub fn create_collection(&self, name: &str) -> Result<Collection> {
        self.create_collection_in(DEFAULT_SCOPE, name)
    }

    /// Creates a collection, creating its scope implicitly when needed.
    /// Fails with [`Error::CollectionAlreadyExists`] on a name collision.
    pub fn create_collection_in(&self, scope: &str, name: &str) -> Result<Collection> {
        self.inner.ensure_open()?;
        catalog::validate_name("scope", scope)?;
        catalog::validate_name("collection", name)?;
        let id = self.inner.manifest.write().create_collection(scope, name)?;
        self.inner.save_manifest()?;
        self.inner.store.ensure_collection(id);
        self.inner.indexes.ensure_collection(id);
        tracing::info!(scope, collection = name, "created collection");
        Ok(Collection {
            inner: Arc::clone(&self.inner),
            id,
            scope: scope.to_string(),
            name: name.to_string(),
        })
    }

    /// Deletes a collection, its documents, and its indexes. Listeners and
    /// live queries on the collection receive a terminal notification. The
    /// default collection cannot be deleted.
    pub fn delete_collection_in(&self, scope: &str, name: &str) -> Result<()> {
        self.inner.ensure_open()?;
        let _gate = self.inner.write_gate.read();
        let id = self.inner.manifest.write().delete_collection(scope, name)?;
        self.inner.save_manifest()?;
        self.inner.store.drop_collection(id);
        self.inner.indexes.drop_collection(id);
        self.inner.bus.publish_collection_dropped(id);
        tracing::info!(scope, collection = name, "deleted collection");
        Ok(())
    }

    /// Deletes a collection in the default scope.
    pub fn delete_collection(&self, name: &str) -> Result<()> {
        self.delete_collection_in(DEFAULT_SCOPE, name)
    }

    /// Re-encrypts the store under a new key, or decrypts it when `None`.
    ///
    /// The rewrite goes through a staging file renamed into place, so a
    /// crash mid-way leaves the store readable under the old key. In-memory
    /// databases only update their configuration.
    pub fn change_encryption_key(&self, new_key: Option<EncryptionKey>) -> Result<()> {
        self.inner.ensure_open()?;
        let _maint = self.inner.maintenance.lock();
        let _freeze = self.inner.write_gate.write();

        let dir_guard = self.inner.dir.read();
        if let Some(store_dir) = dir_guard.as_ref() {
            let records = self.inner.log.read_all()?;
            store_dir.discard_stale_staging()?;
            let staging_path = store_dir.log_staging_path();
            let mut staging = open_log_backend(&staging_path, new_key.clone())?;
            crate::log::write_records(staging.as_mut(), &records)?;
            drop(staging);
            store_dir.commit_log_rewrite()?;
            let reopened = open_log_backend(&store_dir.log_path(), new_key.clone())?;
            self.inner.log.replace_backend(reopened);
        }
        drop(dir_guard);
        self.inner.config.write().encryption_key = new_key;
        tracing::info!(database = %self.inner.name, "changed encryption key");
        Ok(())
    }

    /// Runs a maintenance operation.
    pub fn perform_maintenance(&self, kind: MaintenanceType) -> Result<()> {
        self.inner.ensure_open()?;
        let _maint = self.inner.maintenance.lock();
        match kind {
            MaintenanceType::Compact => self.compact(),
            MaintenanceType::Reindex => self.reindex(),
            MaintenanceType::IntegrityCheck => self.integrity_check(),
            MaintenanceType::Optimize => {
                let removed = self.inner.store.sweep_blobs();
                tracing::info!(database = %self.inner.name, removed, "optimized blob store");
                Ok(())
            }
            MaintenanceType::FullOptimize => {
                self.inner.store.sweep_blobs();
                self.reindex()?;
                self.compact()
            }
        }
    }

    /// Rewrites the commit log to contain only current state: one record
    /// per document (tombstones included) and only referenced blobs.
    fn compact(&self) -> Result<()> {
        let _freeze = self.inner.write_gate.write();
        self.inner.store.sweep_blobs();

        let mut records = Vec::new();
        for (digest, content) in self.inner.store.all_blobs() {
            records.push(LogRecord::BlobPut { digest, content });
        }
        for (id, _, _) in self.inner.all_collections() {
            let Some(state) = self.inner.store.collection(id) else {
                continue;
            };
            for (doc_id, record) in state.all_records() {
                records.push(match record.body {
                    Some(body) => LogRecord::Save {
                        collection: id,
                        id: doc_id,
                        revision: record.revision,
                        sequence: record.sequence,
                        expiration: record.expiration,
                        body,
                    },
                    None => LogRecord::Delete {
                        collection: id,
                        id: doc_id,
                        revision: record.revision,
                        sequence: record.sequence,
                    },
                });
            }
        }

        let dir_guard = self.inner.dir.read();
        match dir_guard.as_ref() {
            Some(store_dir) => {
                store_dir.discard_stale_staging()?;
                let key = self.inner.config.read().encryption_key.clone();
                let mut staging =
                    open_log_backend(&store_dir.log_staging_path(), key.clone())?;
                crate::log::write_records(staging.as_mut(), &records)?;
                drop(staging);
                store_dir.commit_log_rewrite()?;
                let reopened = open_log_backend(&store_dir.log_path(), key)?;
                self.inner.log.replace_backend(reopened);
            }
            None => self.inner.log.rewrite_in_place(&records)?,
        }
        tracing::info!(database = %self.inner.name, records = records.len(), "compacted commit log");
        Ok(())
    }

    /// Rebuilds every index from current documents.
    fn reindex(&self) -> Result<()> {
        let _freeze = self.inner.write_gate.write();
        rebuild_indexes(
            &self.inner.indexes,
            &self.inner.store,
            &self.inner.manifest.read(),
        );
        tracing::info!(database = %self.inner.name, "rebuilt indexes");
        Ok(())
    }

    /// Verifies log checksums and blob reference integrity.
    fn integrity_check(&self) -> Result<()> {
        let _freeze = self.inner.write_gate.write();
        // Re-reading validates framing and CRCs for every record. Blob
        // references in historical saves are checked against the log's own
        // blob records; the store may have swept ones nothing current uses.
        let records = self.inner.log.read_all()?;
        let mut logged = HashSet::new();
        let mut log_referenced = HashSet::new();
        for record in &records {
            match record {
                LogRecord::BlobPut { digest, .. } => {
                    logged.insert(digest.clone());
                }
                LogRecord::Save { body, .. } => {
                    collect_blob_digests(body, &mut log_referenced);
                }
                _ => {}
            }
        }
        for digest in &log_referenced {
            if !logged.contains(digest) && !self.inner.store.has_blob(digest) {
                return Err(Error::corruption(format!(
                    "blob {digest} referenced in log but never written"
                )));
            }
        }

        let mut referenced = HashSet::new();
        for (id, scope, name) in self.inner.all_collections() {
            let Some(state) = self.inner.store.collection(id) else {
                return Err(Error::corruption(format!(
                    "collection {scope}.{name} missing from store"
                )));
            };
            for (_, record) in state.all_records() {
                if let Some(body) = &record.body {
                    collect_blob_digests(body, &mut referenced);
                }
            }
        }
        for digest in referenced {
            if !self.inner.store.has_blob(&digest) {
                return Err(Error::corruption(format!(
                    "blob {digest} referenced but not stored"
                )));
            }
        }
        Ok(())
    }
}

fn open_log_backend(
    path: &Path,
    key: Option<EncryptionKey>,
) -> Result<Box<dyn StorageBackend>> {
    let file = FileBackend::open(path)?;
    Ok(match key {
        Some(key) => Box::new(EncryptedBackend::open(Box::new(file), key)?),
        None => Box::new(file),
    })
}

/// Applies the commit log to empty in-memory state. Records for collection
/// ids absent from the manifest belong to deleted collections and are
/// skipped; ids are never reused, so this cannot misattribute data.
fn replay(store: &Store, manifest: &Manifest, records: &[LogRecord]) {
    let mut known = HashSet::new();
    for scope in manifest.scope_names() {
        if let Some(names) = manifest.collection_names(&scope) {
            for name in names {
                if let Some(meta) = manifest.collection(&scope, &name) {
                    store.ensure_collection(meta.id);
                    known.insert(meta.id);
                }
            }
        }
    }

    for record in records {
        match record {
            LogRecord::Save {
                collection,
                id,
                revision,
                sequence,
                expiration,
                body,
            } => {
                if !known.contains(collection) {
                    continue;
                }
                if let Some(state) = store.collection(*collection) {
                    state.insert(
                        id.clone(),
                        DocRecord {
                            revision: revision.clone(),
                            sequence: *sequence,
                            body: Some(body.clone()),
                            expiration: *expiration,
                        },
                    );
                    state.commit_seq(*sequence);
                }
            }
            LogRecord::Delete {
                collection,
                id,
                revision,
                sequence,
            } => {
                if !known.contains(collection) {
                    continue;
                }
                if let Some(state) = store.collection(*collection) {
                    state.insert(
                        id.clone(),
                        DocRecord {
                            revision: revision.clone(),
                            sequence: *sequence,
                            body: None,
                            expiration: None,
                        },
                    );
                    state.commit_seq(*sequence);
                }
            }
            LogRecord::Purge { collection, id } => {
                if let Some(state) = store.collection(*collection) {
                    state.remove(id);
                }
            }
            LogRecord::SetExpiration {
                collection,
                id,
                expiration,
            } => {
                if let Some(state) = store.collection(*collection) {
                    if let Some(mut record) = state.record(id) {
                        record.expiration = *expiration;
                        state.insert(id.clone(), record);
                    }
                }
            }
            LogRecord::BlobPut { digest, content } => {
                store.put_blob(digest.clone(), content.clone());
            }
        }
    }
}

/// Builds every manifest-defined index from current live documents.
fn rebuild_indexes(indexes: &IndexManager, store: &Store, manifest: &Manifest) {
    let now = now_millis();
    for scope in manifest.scope_names() {
        let Some(names) = manifest.collection_names(&scope) else {
            continue;
        };
        for name in names {
            let Some(meta) = manifest.collection(&scope, &name) else {
                continue;
            };
            indexes.drop_collection(meta.id);
            indexes.ensure_collection(meta.id);
            if let Some(state) = store.collection(meta.id) {
                let docs = state.live_docs(now);
                for (index_name, spec) in &meta.indexes {
                    indexes.add_index(
                        meta.id,
                        index_name,
                        spec,
                        docs.iter().map(|(id, body)| (id.as_str(), body)),
                    );
                }
            }
        }
    }
}


#[cfg(test)]
mod persistence_tests {
    use super::*;
    use crate::document::Document;
    use crate::index::IndexSpec;
    use crate::query::Expr;
    use crate::value::Value;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig::new()
            .directory(dir.path())
            .sync_on_commit(false)
    }

    #[test]
    fn reopen_recovers_state() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open("app", config(&dir)).unwrap();
            let coll = db.create_collection("notes").unwrap();
            let mut doc = Document::with_id("n1");
            doc.set("title", "first");
            coll.save_document(&mut doc).unwrap();
            let mut gone = Document::with_id("n2");
            coll.save_document(&mut gone).unwrap();
            coll.delete_document(&gone).unwrap();
            coll.create_index("by-title", IndexSpec::value(["title"])).unwrap();
            db.close().unwrap();
        }

        let db = Database::open("app", config(&dir)).unwrap();
        let coll = db.collection("notes").unwrap();
        assert_eq!(coll.count().unwrap(), 1);
        let doc = coll.document("n1").unwrap().unwrap();
        assert_eq!(doc.get("title"), Some(&Value::from("first")));
        // Tombstone survives: sequence continues, document stays deleted.
        assert!(coll.document("n2").unwrap().is_none());
        assert_eq!(coll.last_sequence().unwrap().as_u64(), 3);

        // Index definitions were rebuilt from the manifest.
        assert_eq!(coll.index_names().unwrap(), vec!["by-title".to_string()]);
        assert!(coll
            .query(Expr::prop("title").eq("first"))
            .explain()
            .unwrap()
            .starts_with("INDEX EQ"));
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let db = Database::open("locked", config(&dir)).unwrap();
        let err = Database::open("locked", config(&dir)).unwrap_err();
        assert!(matches!(err, Error::DatabaseLocked));
        db.close().unwrap();
        // Released on close.
        Database::open("locked", config(&dir)).unwrap();
    }

    #[test]
    fn missing_store_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir).create_if_missing(false);
        assert!(Database::open("absent", cfg).is_err());
    }

    #[test]
    fn delete_and_exists() {
        let dir = TempDir::new().unwrap();
        let db = Database::open("victim", config(&dir)).unwrap();
        assert!(Database::exists("victim", dir.path()));
        db.delete().unwrap();
        assert!(!Database::exists("victim", dir.path()));
        // Deleting a missing store is a no-op.
        Database::delete_by_path("victim", dir.path()).unwrap();
    }

    #[test]
    fn copy_produces_independent_store() {
        let dir = TempDir::new().unwrap();
        let source_path;
        {
            let db = Database::open("orig", config(&dir)).unwrap();
            source_path = db.path().unwrap().to_path_buf();
            let coll = db.default_collection().unwrap();
            let mut doc = Document::with_id("c1");
            doc.set("v", 1_i64);
            coll.save_document(&mut doc).unwrap();
            db.close().unwrap();
        }

        Database::copy(&source_path, "clone", &config(&dir)).unwrap();
        let copy = Database::open("clone", config(&dir)).unwrap();
        let coll = copy.default_collection().unwrap();
        assert_eq!(coll.count().unwrap(), 1);

        // Writes to the copy leave the original untouched.
        let mut doc = Document::with_id("c2");
        coll.save_document(&mut doc).unwrap();
        copy.close().unwrap();
        let orig = Database::open("orig", config(&dir)).unwrap();
        assert_eq!(orig.default_collection().unwrap().count().unwrap(), 1);
    }

    #[test]
    fn encryption_key_rotation() {
        let dir = TempDir::new().unwrap();
        let key_a = EncryptionKey::from_bytes(&[7u8; 32]).unwrap();
        let key_b = EncryptionKey::from_bytes(&[9u8; 32]).unwrap();

        {
            let db = Database::open("vault", config(&dir)).unwrap();
            let coll = db.default_collection().unwrap();
            let mut doc = Document::with_id("secret");
            doc.set("pin", "1234");
            coll.save_document(&mut doc).unwrap();
            db.change_encryption_key(Some(key_a.clone())).unwrap();
            db.close().unwrap();
        }

        // Plain open now fails; the old data reads fine under key A.
        assert!(Database::open("vault", config(&dir)).is_err());
        {
            let cfg = config(&dir).encryption_key(key_a.clone());
            let db = Database::open("vault", cfg).unwrap();
            let coll = db.default_collection().unwrap();
            assert!(coll.document("secret").unwrap().is_some());
            db.change_encryption_key(Some(key_b.clone())).unwrap();
            db.close().unwrap();
        }

        assert!(Database::open("vault", config(&dir).encryption_key(key_a)).is_err());
        {
            let db = Database::open("vault", config(&dir).encryption_key(key_b)).unwrap();
            db.change_encryption_key(None).unwrap();
            db.close().unwrap();
        }

        // Fully decrypted again.
        let db = Database::open("vault", config(&dir)).unwrap();
        let coll = db.default_collection().unwrap();
        assert_eq!(
            coll.document("secret").unwrap().unwrap().get("pin"),
            Some(&Value::from("1234"))
        );
    }

    #[test]
    fn compaction_shrinks_the_log() {
        let dir = TempDir::new().unwrap();
        let db = Database::open("churn", config(&dir)).unwrap();
        let coll = db.default_collection().unwrap();
        let mut doc = Document::with_id("hot");
        for i in 0..50_i64 {
            doc.set("i", i);
            coll.save_document(&mut doc).unwrap();
        }
        let before = db.inner.log.size().unwrap();
        db.perform_maintenance(MaintenanceType::Compact).unwrap();
        let after = db.inner.log.size().unwrap();
        assert!(after < before, "compaction did not shrink log: {before} -> {after}");

        db.close().unwrap();
        let db = Database::open("churn", config(&dir)).unwrap();
        let doc = db.default_collection().unwrap().document("hot").unwrap().unwrap();
        assert_eq!(doc.get("i"), Some(&Value::Int(49)));
    }

    #[test]
    fn purge_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open("purged", config(&dir)).unwrap();
            let coll = db.default_collection().unwrap();
            let mut doc = Document::with_id("gone");
            coll.save_document(&mut doc).unwrap();
            coll.purge_document(&doc).unwrap();
            db.close().unwrap();
        }
        let db = Database::open("purged", config(&dir)).unwrap();
        let coll = db.default_collection().unwrap();
        assert!(coll.document("gone").unwrap().is_none());
        assert!(matches!(
            coll.document_expiration("gone").unwrap_err(),
            Error::DocumentNotFound { .. }
        ));
    }
}
