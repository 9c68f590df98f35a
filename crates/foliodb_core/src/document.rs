//! Documents: identified, versioned JSON-like values.

use crate::blob::Blob;
use crate::types::{Revision, SequenceNumber};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// A document: a string id plus a JSON-compatible body.
///
/// Documents carry an optional base [`Revision`] used for optimistic
/// concurrency. A freshly constructed document has no revision; after a
/// successful save the revision and sequence fields reflect the stored
/// state. Reloading via [`crate::Collection::document`] yields the committed
/// revision to use as the base for the next save.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    body: BTreeMap<String, Value>,
    revision: Option<Revision>,
    sequence: Option<SequenceNumber>,
    /// Blob contents attached since the last save, keyed by digest.
    pub(crate) pending_blobs: HashMap<String, Vec<u8>>,
}

impl Document {
    /// Creates an empty document with a generated unique id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Creates an empty document with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: BTreeMap::new(),
            revision: None,
            sequence: None,
            pending_blobs: HashMap::new(),
        }
    }

    pub(crate) fn from_stored(
        id: String,
        body: BTreeMap<String, Value>,
        revision: Revision,
        sequence: SequenceNumber,
    ) -> Self {
        Self {
            id,
            body,
            revision: Some(revision),
            sequence: Some(sequence),
            pending_blobs: HashMap::new(),
        }
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the base revision, if the document has been saved or loaded.
    #[must_use]
    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    /// Returns the sequence assigned by the last committed save.
    #[must_use]
    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.sequence
    }

    /// Returns a property value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Navigates a dotted property path into the body.
    #[must_use]
    pub fn at_path(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let value = self.body.get(head)?;
        match rest {
            Some(rest) => value.at_path(rest),
            None => Some(value),
        }
    }

    /// Sets a property value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Removes a property, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.body.remove(key)
    }

    /// Returns true if the body has the given top-level property.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    /// Attaches a blob under the given property key.
    ///
    /// The blob's content is written to the database when this document is
    /// saved; until then it is held on the document.
    pub fn set_blob(&mut self, key: impl Into<String>, blob: Blob) -> &mut Self {
        let (reference, content) = blob.into_parts();
        self.pending_blobs.insert(reference.digest.clone(), content);
        self.body.insert(key.into(), Value::Blob(reference));
        self
    }

    /// Returns the document body.
    #[must_use]
    pub fn body(&self) -> &BTreeMap<String, Value> {
        &self.body
    }

    /// Returns the body as a single [`Value::Object`].
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Builds the body from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] if `json` is not an object.
    pub fn set_json(&mut self, json: &serde_json::Value) -> crate::Result<&mut Self> {
        match Value::from_json(json) {
            Value::Object(map) => {
                self.body = map;
                Ok(self)
            }
            _ => Err(crate::Error::invalid_argument(
                "document body must be a JSON object",
            )),
        }
    }

    /// Returns the body as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_value().to_json()
    }

    pub(crate) fn set_committed(&mut self, revision: Revision, sequence: SequenceNumber) {
        self.revision = Some(revision);
        self.sequence = Some(sequence);
        self.pending_blobs.clear();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = Document::new();
        let b = Document::new();
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_empty());
    }

    #[test]
    fn property_access() {
        let mut doc = Document::with_id("d1");
        doc.set("name", "Alice").set("age", 34);

        assert_eq!(doc.get("name").and_then(Value::as_str), Some("Alice"));
        assert_eq!(doc.get("age").and_then(Value::as_int), Some(34));
        assert!(doc.contains("name"));
        assert_eq!(doc.remove("name").and_then(|v| v.as_str().map(String::from)), Some("Alice".to_string()));
        assert!(!doc.contains("name"));
    }

    #[test]
    fn at_path_traverses_nested_values() {
        let mut doc = Document::with_id("d1");
        doc.set_json(&serde_json::json!({
            "address": { "city": "Porto" },
            "tags": ["x", "y"],
        }))
        .unwrap();

        assert_eq!(
            doc.at_path("address.city").and_then(Value::as_str),
            Some("Porto")
        );
        assert_eq!(doc.at_path("tags.0").and_then(Value::as_str), Some("x"));
        assert!(doc.at_path("missing.path").is_none());
    }

    #[test]
    fn set_json_rejects_non_objects() {
        let mut doc = Document::new();
        assert!(doc.set_json(&serde_json::json!([1, 2])).is_err());
        assert!(doc.set_json(&serde_json::json!("str")).is_err());
    }

    #[test]
    fn new_document_has_no_revision() {
        let doc = Document::new();
        assert!(doc.revision().is_none());
        assert!(doc.sequence().is_none());
    }

    #[test]
    fn set_blob_stashes_content_until_save() {
        let mut doc = Document::new();
        doc.set_blob("avatar", crate::Blob::new(Some("image/png"), vec![9, 9]));

        let blob_ref = doc.get("avatar").and_then(Value::as_blob).unwrap();
        assert_eq!(blob_ref.length, 2);
        assert!(doc.pending_blobs.contains_key(&blob_ref.digest));
    }
}
