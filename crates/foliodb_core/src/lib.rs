//! # FolioDB Core
//!
//! Embedded document database engine for FolioDB.
//!
//! This crate provides:
//! - JSON-compatible documents with optimistic concurrency (revisions)
//! - Scopes and collections with a durable manifest
//! - A CRC-checked commit log for durability and crash recovery
//! - Change notification: collection, document, and live-query listeners
//! - Value and full-text secondary indexes
//! - Queries with index-aware planning
//! - Document expiration with a background sweep
//!
//! Open a database with [`Database::open`] (or [`Database::open_in_memory`]
//! for tests), fetch a [`Collection`], and work with [`Document`] values:
//!
//! ```rust,ignore
//! use foliodb_core::{Database, DatabaseConfig, Document};
//!
//! let db = Database::open("orders", DatabaseConfig::new())?;
//! let orders = db.default_collection()?;
//!
//! let mut doc = Document::new();
//! doc.set("status", "open").set("total", 119.5_f64);
//! orders.save_document(&mut doc)?;
//!
//! db.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod catalog;
mod changes;
mod collection;
mod config;
mod database;
mod dir;
mod document;
mod error;
mod expiry;
mod index;
mod log;
mod manifest;
mod query;
mod store;
mod types;
mod value;

pub use blob::{Blob, BlobRef};
pub use catalog::{ScopeInfo, DEFAULT_COLLECTION, DEFAULT_SCOPE};
pub use changes::{CollectionChange, DocumentChange, ListenerToken};
pub use collection::Collection;
pub use config::DatabaseConfig;
pub use database::Database;
pub use document::Document;
pub use error::{Error, Result};
pub use index::IndexSpec;
pub use query::{Expr, Query, QueryChange, ResultSet, Row};
pub use types::{ConcurrencyControl, MaintenanceType, Revision, SequenceNumber};

pub use foliodb_storage::{EncryptionKey, KEY_SIZE};
