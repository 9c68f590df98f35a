//! Database manifest: persisted catalog metadata.
//!
//! The manifest is the authoritative record of scopes, collections, and
//! index definitions. It is saved atomically (see [`crate::dir`]) whenever
//! the catalog changes, so collection ids and index specs survive restarts.
//! Document data lives in the commit log, not here.

use crate::catalog::{DEFAULT_COLLECTION, DEFAULT_SCOPE};
use crate::error::{Error, Result};
use crate::index::IndexSpec;
use crate::types::CollectionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Magic bytes prefixing the manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"FMAN";

/// Metadata for a single collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Stable collection id, never reused.
    pub id: CollectionId,
    /// Index definitions by name.
    pub indexes: BTreeMap<String, IndexSpec>,
}

/// Metadata for a scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeMeta {
    /// Collections in the scope, by name.
    pub collections: BTreeMap<String, CollectionMeta>,
}

/// The database manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Store format version (major, minor).
    pub format_version: (u16, u16),
    /// Scopes by name.
    pub scopes: BTreeMap<String, ScopeMeta>,
    /// Next collection id to assign.
    pub next_collection_id: u32,
}

impl Manifest {
    /// Creates a manifest with the default scope and default collection.
    #[must_use]
    pub fn new(format_version: (u16, u16)) -> Self {
        let mut scope = ScopeMeta::default();
        scope.collections.insert(
            DEFAULT_COLLECTION.to_string(),
            CollectionMeta {
                id: CollectionId::new(1),
                indexes: BTreeMap::new(),
            },
        );
        let mut scopes = BTreeMap::new();
        scopes.insert(DEFAULT_SCOPE.to_string(), scope);
        Self {
            format_version,
            scopes,
            next_collection_id: 2,
        }
    }

    /// Looks up a collection's metadata.
    #[must_use]
    pub fn collection(&self, scope: &str, name: &str) -> Option<&CollectionMeta> {
        self.scopes.get(scope)?.collections.get(name)
    }

    /// Looks up a collection's metadata mutably.
    pub fn collection_mut(&mut self, scope: &str, name: &str) -> Option<&mut CollectionMeta> {
        self.scopes.get_mut(scope)?.collections.get_mut(name)
    }

    /// Creates a collection, creating the scope implicitly if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionAlreadyExists`] if the name is taken.
    pub fn create_collection(&mut self, scope: &str, name: &str) -> Result<CollectionId> {
        let scope_meta = self.scopes.entry(scope.to_string()).or_default();
        if scope_meta.collections.contains_key(name) {
            return Err(Error::CollectionAlreadyExists {
                scope: scope.to_string(),
                name: name.to_string(),
            });
        }
        let id = CollectionId::new(self.next_collection_id);
        self.next_collection_id += 1;
        scope_meta.collections.insert(
            name.to_string(),
            CollectionMeta {
                id,
                indexes: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Removes a collection, removing its scope if it becomes empty.
    ///
    /// The default collection cannot be deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if absent, or
    /// [`Error::InvalidArgument`] for the default collection.
    pub fn delete_collection(&mut self, scope: &str, name: &str) -> Result<CollectionId> {
        if scope == DEFAULT_SCOPE && name == DEFAULT_COLLECTION {
            return Err(Error::invalid_argument(
                "the default collection cannot be deleted",
            ));
        }
        let scope_meta = self
            .scopes
            .get_mut(scope)
            .ok_or_else(|| Error::ScopeNotFound {
                name: scope.to_string(),
            })?;
        let meta = scope_meta
            .collections
            .remove(name)
            .ok_or_else(|| Error::CollectionNotFound {
                scope: scope.to_string(),
                name: name.to_string(),
            })?;
        // Non-default scopes disappear with their last collection.
        if scope != DEFAULT_SCOPE && scope_meta.collections.is_empty() {
            self.scopes.remove(scope);
        }
        Ok(meta.id)
    }

    /// Returns scope names in sorted order.
    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    /// Returns collection names within a scope, in sorted order.
    #[must_use]
    pub fn collection_names(&self, scope: &str) -> Option<Vec<String>> {
        self.scopes
            .get(scope)
            .map(|s| s.collections.keys().cloned().collect())
    }

    /// Encodes the manifest (magic prefix + CBOR body).
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC);
        ciborium::into_writer(self, &mut buf).map_err(Error::codec)?;
        Ok(buf)
    }

    /// Decodes a manifest from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] on a bad magic prefix or malformed body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 || data[0..4] != MANIFEST_MAGIC {
            return Err(Error::corruption("invalid manifest magic"));
        }
        ciborium::from_reader(&data[4..])
            .map_err(|e| Error::corruption(format!("malformed manifest: {e}")))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new((1, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_manifest_has_defaults() {
        let m = Manifest::default();
        let meta = m.collection(DEFAULT_SCOPE, DEFAULT_COLLECTION).unwrap();
        assert_eq!(meta.id, CollectionId::new(1));
        assert_eq!(m.scope_names(), vec![DEFAULT_SCOPE.to_string()]);
    }

    #[test]
    fn create_and_delete_collection() {
        let mut m = Manifest::default();
        let id = m.create_collection("inventory", "widgets").unwrap();
        assert_eq!(id, CollectionId::new(2));
        assert!(m.collection("inventory", "widgets").is_some());

        // Duplicate create fails.
        assert!(matches!(
            m.create_collection("inventory", "widgets"),
            Err(Error::CollectionAlreadyExists { .. })
        ));

        let deleted = m.delete_collection("inventory", "widgets").unwrap();
        assert_eq!(deleted, id);
        // Scope vanished with its last collection.
        assert!(!m.scopes.contains_key("inventory"));
    }

    #[test]
    fn collection_ids_are_not_reused() {
        let mut m = Manifest::default();
        let id1 = m.create_collection("s", "a").unwrap();
        m.delete_collection("s", "a").unwrap();
        let id2 = m.create_collection("s", "a").unwrap();
        assert_ne!(id1, id2);
    }

    #[test]
    fn default_collection_cannot_be_deleted() {
        let mut m = Manifest::default();
        assert!(matches!(
            m.delete_collection(DEFAULT_SCOPE, DEFAULT_COLLECTION),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn default_scope_survives_empty() {
        let mut m = Manifest::default();
        m.create_collection(DEFAULT_SCOPE, "extra").unwrap();
        m.delete_collection(DEFAULT_SCOPE, "extra").unwrap();
        assert!(m.scopes.contains_key(DEFAULT_SCOPE));
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut m = Manifest::default();
        m.create_collection("inventory", "widgets").unwrap();
        m.collection_mut("inventory", "widgets")
            .unwrap()
            .indexes
            .insert(
                "by_name".to_string(),
                IndexSpec::value(["name"]),
            );

        let encoded = m.encode().unwrap();
        let decoded = Manifest::decode(&encoded).unwrap();
        assert_eq!(decoded.next_collection_id, m.next_collection_id);
        assert!(decoded.collection("inventory", "widgets").is_some());
        assert!(decoded
            .collection("inventory", "widgets")
            .unwrap()
            .indexes
            .contains_key("by_name"));
    }

    #[test]
    fn decode_rejects_bad_magic() {
        assert!(Manifest::decode(b"XXXXrest").is_err());
        assert!(Manifest::decode(b"") .is_err());
    }
}
