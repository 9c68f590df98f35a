//! # FolioDB Storage
//!
//! Storage backend trait and implementations for FolioDB.
//!
//! This crate provides the lowest-level storage abstraction for FolioDB.
//! Storage backends are **opaque byte stores** - they do not interpret
//! the data they store.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, truncate, flush)
//! - No knowledge of FolioDB record formats, the commit log, or documents
//! - Must be `Send + Sync` for concurrent access
//! - FolioDB core owns all file format interpretation
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - For persistent storage using OS file APIs
//! - [`EncryptedBackend`] - Wrapper that adds AES-256-GCM encryption
//!
//! ## Example
//!
//! ```rust
//! use foliodb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod encrypted;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use encrypted::{EncryptedBackend, EncryptionKey, KEY_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
