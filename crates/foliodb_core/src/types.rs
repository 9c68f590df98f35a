//! Core type definitions for FolioDB.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence number ordering committed writes within a collection.
///
/// Sequence numbers strictly increase with every committed write to a
/// collection and are never reused. Failed writes do not consume one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Identifier for a collection within a database.
///
/// Collection ids are stable, assigned when collections are created, and
/// never reused after deletion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a new collection id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Opaque revision marker used for optimistic concurrency on a document.
///
/// A revision is a `generation-digest` pair. The generation strictly
/// increases along a document's lineage; the digest makes concurrent
/// writes at the same generation distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    /// Creates the first revision for a new document.
    #[must_use]
    pub(crate) fn first() -> Self {
        Self(format!("1-{}", Self::digest()))
    }

    /// Creates the revision that follows `prev`.
    #[must_use]
    pub(crate) fn next(prev: &Revision) -> Self {
        Self(format!("{}-{}", prev.generation() + 1, Self::digest()))
    }

    fn digest() -> String {
        let mut s = uuid::Uuid::new_v4().simple().to_string();
        s.truncate(16);
        s
    }

    /// Returns the generation component of this revision.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.0
            .split('-')
            .next()
            .and_then(|g| g.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the revision as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Concurrency control mode for save and delete operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyControl {
    /// Overwrite the stored document regardless of its revision.
    #[default]
    LastWriteWins,
    /// Fail with [`crate::Error::Conflict`] if the stored revision differs
    /// from the document's base revision.
    FailOnConflict,
}

/// Maintenance operations supported by [`crate::Database::perform_maintenance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceType {
    /// Rewrite the commit log, dropping superseded revisions and
    /// unreferenced blobs.
    Compact,
    /// Rebuild all indexes from current document state.
    Reindex,
    /// Verify commit-log framing, checksums, and blob references.
    IntegrityCheck,
    /// Reclaim blobs no current document references.
    Optimize,
    /// Blob reclamation, then `Reindex`, then `Compact`.
    FullOptimize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_next() {
        let s1 = SequenceNumber::new(5);
        assert_eq!(s1.next().as_u64(), 6);
    }

    #[test]
    fn collection_id_display() {
        assert_eq!(format!("{}", CollectionId::new(42)), "col:42");
    }

    #[test]
    fn revision_generations_increase() {
        let r1 = Revision::first();
        assert_eq!(r1.generation(), 1);

        let r2 = Revision::next(&r1);
        let r3 = Revision::next(&r2);
        assert_eq!(r2.generation(), 2);
        assert_eq!(r3.generation(), 3);
    }

    #[test]
    fn revisions_at_same_generation_differ() {
        let base = Revision::first();
        let a = Revision::next(&base);
        let b = Revision::next(&base);
        assert_eq!(a.generation(), b.generation());
        assert_ne!(a, b);
    }

    #[test]
    fn revision_format() {
        let r = Revision::first();
        let parts: Vec<&str> = r.as_str().splitn(2, '-').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "1");
        assert_eq!(parts[1].len(), 16);
    }
}
