//! Encrypted storage backend wrapper.
//!
//! This module provides an encrypted storage backend that wraps any other
//! backend with AES-256-GCM encryption at rest.
//!
//! ## Security Model
//!
//! - Each appended chunk is encrypted independently with a fresh random nonce
//! - Chunk structure on the inner backend:
//!   `length (4 bytes LE) || nonce (12 bytes) || ciphertext+tag`
//! - Uses AES-256-GCM for authenticated encryption
//! - Keys are never stored; they must be provided by the application
//!
//! ## Access Model
//!
//! FolioDB replays its commit log fully on open, so random access into
//! ciphertext buys nothing. On open, all chunks are decrypted into a
//! plaintext image held in memory; reads are served from that image and
//! appends encrypt one chunk each. `truncate` rewrites the inner file as a
//! single fresh chunk.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use parking_lot::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of a GCM nonce in bytes.
const NONCE_SIZE: usize = 12;
/// Size of the chunk length prefix in bytes.
const LEN_SIZE: usize = 4;

/// Encryption key for the encrypted backend.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An encrypted storage backend that wraps another backend.
///
/// All data written through this backend is encrypted with AES-256-GCM.
/// A plaintext image of the store is kept in memory; the inner backend only
/// ever sees framed ciphertext chunks.
///
/// # Example
///
/// ```
/// use foliodb_storage::{InMemoryBackend, EncryptedBackend, EncryptionKey, StorageBackend};
///
/// let key = EncryptionKey::from_bytes(&[7u8; 32]).unwrap();
/// let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key).unwrap();
/// backend.append(b"secret").unwrap();
/// assert_eq!(backend.read_at(0, 6).unwrap(), b"secret");
/// ```
pub struct EncryptedBackend {
    state: Mutex<State>,
    cipher: Aes256Gcm,
}

struct State {
    inner: Box<dyn StorageBackend>,
    /// Decrypted image of the full store contents.
    plaintext: Vec<u8>,
}

impl EncryptedBackend {
    /// Opens an encrypted backend over the given inner backend.
    ///
    /// Existing chunks in the inner backend are authenticated and decrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner backend cannot be read, a chunk is
    /// malformed, or authentication fails (wrong key or tampered data).
    pub fn open(inner: Box<dyn StorageBackend>, key: EncryptionKey) -> StorageResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| StorageError::Encryption(format!("cipher init failed: {e}")))?;

        let mut plaintext = Vec::new();
        let physical_size = inner.size()?;
        let mut offset = 0u64;

        while offset < physical_size {
            let len_bytes = inner.read_at(offset, LEN_SIZE)?;
            let chunk_len = u32::from_le_bytes(
                len_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::Corrupted("short chunk header".into()))?,
            ) as usize;
            offset += LEN_SIZE as u64;

            if chunk_len < NONCE_SIZE {
                return Err(StorageError::Corrupted(format!(
                    "encrypted chunk too short: {chunk_len} bytes"
                )));
            }

            let chunk = inner.read_at(offset, chunk_len)?;
            offset += chunk_len as u64;

            let nonce = Nonce::from_slice(&chunk[..NONCE_SIZE]);
            let decrypted = cipher
                .decrypt(nonce, &chunk[NONCE_SIZE..])
                .map_err(|_| StorageError::Encryption("decryption failed: wrong key or corrupted data".into()))?;
            plaintext.extend_from_slice(&decrypted);
        }

        Ok(Self {
            state: Mutex::new(State { inner, plaintext }),
            cipher,
        })
    }

    fn encrypt_chunk(&self, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| StorageError::Encryption(format!("encryption failed: {e}")))?;

        let chunk_len = NONCE_SIZE + ciphertext.len();
        let len = u32::try_from(chunk_len)
            .map_err(|_| StorageError::Encryption("chunk too large".into()))?;

        let mut framed = Vec::with_capacity(LEN_SIZE + chunk_len);
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }
}

impl StorageBackend for EncryptedBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.state.lock();
        let size = state.plaintext.len() as u64;
        let start = usize::try_from(offset)
            .map_err(|_| StorageError::ReadPastEnd { offset, len, size })?;
        let end = start.saturating_add(len);

        if offset > size || end > state.plaintext.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(state.plaintext[start..end].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if data.is_empty() {
            return Ok(self.state.lock().plaintext.len() as u64);
        }

        let framed = self.encrypt_chunk(data)?;
        let mut state = self.state.lock();
        let offset = state.plaintext.len() as u64;
        state.inner.append(&framed)?;
        state.plaintext.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.state.lock().inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.lock().plaintext.len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.state.lock().inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let retained = {
            let state = self.state.lock();
            let current = state.plaintext.len() as u64;
            if new_size > current {
                return Err(StorageError::Corrupted(format!(
                    "cannot truncate to {new_size}: current size is {current}"
                )));
            }
            state.plaintext[..new_size as usize].to_vec()
        };

        // Rewrite the inner file as a single fresh chunk.
        let framed = if retained.is_empty() {
            Vec::new()
        } else {
            self.encrypt_chunk(&retained)?
        };

        let mut state = self.state.lock();
        state.inner.truncate(0)?;
        if !framed.is_empty() {
            state.inner.append(&framed)?;
        }
        state.inner.sync()?;
        state.plaintext = retained;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    fn key(byte: u8) -> EncryptionKey {
        EncryptionKey::from_bytes(&[byte; KEY_SIZE]).unwrap()
    }

    #[test]
    fn key_requires_32_bytes() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
        assert!(EncryptionKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn round_trip() {
        let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key(1)).unwrap();
        let offset = backend.append(b"secret data").unwrap();
        assert_eq!(offset, 0);
        assert_eq!(backend.read_at(0, 11).unwrap(), b"secret data");
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let inner = InMemoryBackend::new();
        let mut backend = EncryptedBackend::open(Box::new(inner), key(1)).unwrap();
        backend.append(b"secret data").unwrap();

        // The logical view matches but the encrypted size is larger
        // (frame + nonce + tag), and plaintext never hits the inner store.
        let state = backend.state.lock();
        let physical = state.inner.size().unwrap();
        assert!(physical > 11);
        let raw = state.inner.read_at(0, physical as usize).unwrap();
        assert!(!raw.windows(11).any(|w| w == b"secret data"));
    }

    #[test]
    fn reopen_with_same_key() {
        let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key(2)).unwrap();
        backend.append(b"first").unwrap();
        backend.append(b"second").unwrap();

        let encrypted = {
            let state = backend.state.lock();
            let size = state.inner.size().unwrap();
            state.inner.read_at(0, size as usize).unwrap()
        };

        let reopened =
            EncryptedBackend::open(Box::new(InMemoryBackend::with_data(encrypted)), key(2))
                .unwrap();
        assert_eq!(reopened.read_at(0, 11).unwrap(), b"firstsecond");
    }

    #[test]
    fn wrong_key_fails_open() {
        let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key(3)).unwrap();
        backend.append(b"data").unwrap();

        let encrypted = {
            let state = backend.state.lock();
            let size = state.inner.size().unwrap();
            state.inner.read_at(0, size as usize).unwrap()
        };

        let result =
            EncryptedBackend::open(Box::new(InMemoryBackend::with_data(encrypted)), key(4));
        assert!(matches!(result, Err(StorageError::Encryption(_))));
    }

    #[test]
    fn truncate_rewrites_chunks() {
        let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key(5)).unwrap();
        backend.append(b"hello world").unwrap();
        backend.truncate(5).unwrap();

        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.read_at(0, 5).unwrap(), b"hello");
        assert!(backend.read_at(5, 1).is_err());
    }

    #[test]
    fn truncate_to_zero() {
        let mut backend = EncryptedBackend::open(Box::new(InMemoryBackend::new()), key(6)).unwrap();
        backend.append(b"data").unwrap();
        backend.truncate(0).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }
}
