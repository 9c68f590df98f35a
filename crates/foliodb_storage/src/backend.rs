//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-oriented byte store the engine writes its commit log through.
///
/// A backend holds a single growable sequence of bytes and knows nothing
/// about what they mean: record framing, manifests, and documents are all
/// interpreted above this trait. Keeping the contract this small is what
/// lets the encrypted wrapper slot in between the engine and the file
/// without either side noticing.
///
/// Implementations must uphold:
///
/// - `append` reports the offset its data landed at, and offsets only grow
/// - `read_at` hands back exactly the bytes that were appended there
/// - once `flush` returns, every appended byte survives process death
/// - implementations are `Send + Sync`; the engine shares one behind a lock
///
/// Provided implementations: [`super::FileBackend`] for disk,
/// [`super::InMemoryBackend`] for ephemeral stores and tests, and
/// [`super::EncryptedBackend`], which wraps either of the others.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails when the requested range extends past the current size, or on
    /// an underlying I/O error. Short reads are never returned.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends bytes at the end and returns the offset they were written at.
    ///
    /// # Errors
    ///
    /// Fails on an underlying I/O error.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Fails when the data cannot be forced to stable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current size in bytes, which is also the offset the next `append`
    /// will write at.
    ///
    /// # Errors
    ///
    /// Fails when the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Like `flush`, but also forces file metadata (length in particular)
    /// down, so a crash cannot lose the tail of the file.
    ///
    /// # Errors
    ///
    /// Fails when the sync cannot be completed.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards everything at and beyond `new_size`. Used when a rewritten
    /// log replaces a longer one in place.
    ///
    /// # Errors
    ///
    /// Fails when `new_size` exceeds the current size, or on an underlying
    /// I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
