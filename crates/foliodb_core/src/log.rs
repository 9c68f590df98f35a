//! Commit log: durable record of every committed write.
//!
//! Each committed operation appends one framed record:
//!
//! ```text
//! magic (4) | version (2 LE) | payload len (4 LE) | CBOR payload | crc32 (4 LE)
//! ```
//!
//! The CRC covers everything before it. On open, the log is replayed in
//! order to rebuild the in-memory store. A torn record at the tail (crash
//! mid-append) ends replay cleanly; a CRC mismatch anywhere else is
//! corruption.

use crate::error::{Error, Result};
use crate::types::{CollectionId, Revision, SequenceNumber};
use crate::value::Value;
use foliodb_storage::StorageBackend;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a commit-log record.
pub const LOG_MAGIC: [u8; 4] = *b"FLOG";

/// Current commit-log format version.
pub const LOG_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + length (4).
const HEADER_SIZE: usize = 10;
/// Trailing CRC size.
const CRC_SIZE: usize = 4;

/// A committed operation in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    /// A document save (insert or update).
    Save {
        /// Collection the document belongs to.
        collection: CollectionId,
        /// Document id.
        id: String,
        /// Revision assigned by this save.
        revision: Revision,
        /// Sequence assigned by this save.
        sequence: SequenceNumber,
        /// Expiration carried over from prior state, unix millis.
        expiration: Option<u64>,
        /// Document body.
        body: Value,
    },
    /// A document delete (tombstone).
    Delete {
        /// Collection the document belongs to.
        collection: CollectionId,
        /// Document id.
        id: String,
        /// Revision assigned to the tombstone.
        revision: Revision,
        /// Sequence assigned by this delete.
        sequence: SequenceNumber,
    },
    /// An unconditional purge.
    Purge {
        /// Collection the document belonged to.
        collection: CollectionId,
        /// Document id.
        id: String,
    },
    /// An expiration change.
    SetExpiration {
        /// Collection the document belongs to.
        collection: CollectionId,
        /// Document id.
        id: String,
        /// New expiration, unix millis; `None` clears it.
        expiration: Option<u64>,
    },
    /// Blob content, stored once per digest.
    BlobPut {
        /// Content digest (`sha256-<hex>`).
        digest: String,
        /// Raw content bytes.
        content: Vec<u8>,
    },
}

/// Encodes one record with framing and CRC.
pub(crate) fn encode_record(record: &LogRecord) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(record, &mut payload).map_err(Error::codec)?;

    let len = u32::try_from(payload.len())
        .map_err(|_| Error::invalid_argument("commit-log record too large"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);

    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Manages appends to and replays of the commit log.
pub struct LogManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl LogManager {
    /// Creates a log manager over a storage backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends a record, flushing if `sync_on_commit` is set.
    ///
    /// Returns the offset where the record was written.
    pub fn append(&self, record: &LogRecord) -> Result<u64> {
        let data = encode_record(record)?;
        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        if self.sync_on_commit {
            backend.flush()?;
        }
        Ok(offset)
    }

    /// Flushes pending writes.
    pub fn flush(&self) -> Result<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Syncs data and metadata to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads all records from the start of the log.
    ///
    /// A torn record at the tail ends the read cleanly; corruption anywhere
    /// else is an error.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        let backend = self.backend.lock();
        read_records(backend.as_ref())
    }

    /// Replaces the underlying backend (after a staged rewrite).
    pub(crate) fn replace_backend(&self, new_backend: Box<dyn StorageBackend>) {
        *self.backend.lock() = new_backend;
    }

    /// Rewrites the log in place to contain exactly `records`.
    ///
    /// Used for in-memory stores and as the fallback when no staging
    /// directory exists; persistent compaction goes through the staged
    /// rename in [`crate::dir::StoreDir`] instead.
    pub(crate) fn rewrite_in_place(&self, records: &[LogRecord]) -> Result<()> {
        let mut backend = self.backend.lock();
        backend.truncate(0)?;
        for record in records {
            let data = encode_record(record)?;
            backend.append(&data)?;
        }
        backend.sync()?;
        Ok(())
    }
}

/// Reads every record from a backend.
pub(crate) fn read_records(backend: &dyn StorageBackend) -> Result<Vec<LogRecord>> {
    let size = backend.size()?;
    let mut records = Vec::new();
    let mut offset = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < (HEADER_SIZE + CRC_SIZE) as u64 {
            // Torn tail from a crashed append.
            tracing::warn!(offset, remaining, "truncated record at commit-log tail");
            break;
        }

        let header = backend.read_at(offset, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(Error::corruption(format!(
                "bad commit-log magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            return Err(Error::corruption(format!(
                "unsupported commit-log version {version}"
            )));
        }
        let payload_len =
            u32::from_le_bytes([header[6], header[7], header[8], header[9]]) as usize;

        let full_len = (HEADER_SIZE + payload_len + CRC_SIZE) as u64;
        if offset + full_len > size {
            tracing::warn!(offset, "torn record at commit-log tail");
            break;
        }

        let framed = backend.read_at(offset, HEADER_SIZE + payload_len)?;
        let crc_bytes = backend.read_at(offset + (HEADER_SIZE + payload_len) as u64, CRC_SIZE)?;
        let stored_crc = u32::from_le_bytes([
            crc_bytes[0],
            crc_bytes[1],
            crc_bytes[2],
            crc_bytes[3],
        ]);
        let actual_crc = crc32fast::hash(&framed);
        if stored_crc != actual_crc {
            return Err(Error::corruption(format!(
                "commit-log checksum mismatch at offset {offset}: expected {stored_crc:08x}, got {actual_crc:08x}"
            )));
        }

        let record: LogRecord = ciborium::from_reader(&framed[HEADER_SIZE..])
            .map_err(|e| Error::corruption(format!("malformed commit-log record: {e}")))?;
        records.push(record);
        offset += full_len;
    }

    Ok(records)
}

/// Writes `records` to a fresh backend (staged log rewrite).
pub(crate) fn write_records(
    backend: &mut dyn StorageBackend,
    records: &[LogRecord],
) -> Result<()> {
    for record in records {
        let data = encode_record(record)?;
        backend.append(&data)?;
    }
    backend.sync()?;
    Ok(())
}
