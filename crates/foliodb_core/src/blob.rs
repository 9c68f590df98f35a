//! Binary blob attachments.
//!
//! Blobs are content-addressed: the digest of the content identifies it
//! within the database, so identical payloads are stored once. Documents
//! reference blobs by key through [`BlobRef`] values in their body.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reference to a stored blob: digest, declared content type, and length.
///
/// A `BlobRef` appears inside a document body; the bytes themselves live in
/// the database's blob store and are fetched with
/// [`crate::Collection::blob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Content digest, `sha256-<hex>`.
    pub digest: String,
    /// Declared content type, e.g. `image/png`.
    pub content_type: Option<String>,
    /// Content length in bytes.
    pub length: u64,
}

impl BlobRef {
    pub(crate) fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "digest": self.digest,
            "content_type": self.content_type,
            "length": self.length,
        })
    }

    /// Reconstructs a blob reference from a `{"@blob": {...}}` tagged JSON
    /// object, if the map is one.
    pub(crate) fn from_json_tag(
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Option<BlobRef> {
        let tag = map.get("@blob")?;
        if map.len() != 1 {
            return None;
        }
        Some(BlobRef {
            digest: tag.get("digest")?.as_str()?.to_string(),
            content_type: tag
                .get("content_type")
                .and_then(|v| v.as_str())
                .map(String::from),
            length: tag.get("length")?.as_u64()?,
        })
    }
}

/// A binary payload to attach to a document.
///
/// Construct with [`Blob::new`], then attach it to a document with
/// [`crate::Document::set_blob`]. The content is written to the database
/// when the document is saved.
#[derive(Debug, Clone)]
pub struct Blob {
    reference: BlobRef,
    content: Vec<u8>,
}

impl Blob {
    /// Creates a blob from raw content and an optional content type.
    #[must_use]
    pub fn new(content_type: Option<&str>, content: Vec<u8>) -> Self {
        let digest = content_digest(&content);
        Self {
            reference: BlobRef {
                digest,
                content_type: content_type.map(String::from),
                length: content.len() as u64,
            },
            content,
        }
    }

    /// Returns the reference identifying this blob.
    #[must_use]
    pub fn reference(&self) -> &BlobRef {
        &self.reference
    }

    /// Returns the blob content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub(crate) fn into_parts(self) -> (BlobRef, Vec<u8>) {
        (self.reference, self.content)
    }

    pub(crate) fn from_parts(reference: BlobRef, content: Vec<u8>) -> Self {
        Self { reference, content }
    }
}

/// Computes the content-addressed digest for a payload.
#[must_use]
pub(crate) fn content_digest(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    let mut hex = String::with_capacity(7 + hash.len() * 2);
    hex.push_str("sha256-");
    for byte in hash {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_content_addressed() {
        let a = Blob::new(Some("text/plain"), b"same bytes".to_vec());
        let b = Blob::new(None, b"same bytes".to_vec());
        let c = Blob::new(None, b"other bytes".to_vec());

        assert_eq!(a.reference().digest, b.reference().digest);
        assert_ne!(a.reference().digest, c.reference().digest);
        assert!(a.reference().digest.starts_with("sha256-"));
        assert_eq!(a.reference().length, 10);
    }

    #[test]
    fn json_tag_round_trip() {
        let blob = Blob::new(Some("image/png"), vec![1, 2, 3]);
        let json = blob.reference().to_json();

        let mut map = serde_json::Map::new();
        map.insert("@blob".to_string(), json);
        let back = BlobRef::from_json_tag(&map).unwrap();
        assert_eq!(&back, blob.reference());
    }
}
