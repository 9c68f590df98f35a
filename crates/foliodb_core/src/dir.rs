//! Store directory management.
//!
//! On-disk layout for a FolioDB store:
//!
//! ```text
//! <parent>/<name>.folio/
//! ├─ MANIFEST          # Catalog metadata (scopes, collections, indexes)
//! ├─ LOCK              # Advisory lock for single-session access
//! └─ commit.log        # Commit log (documents, blobs)
//! ```
//!
//! The LOCK file ensures only one session can own the store at a time.
//! MANIFEST writes use a temp-file + rename + directory fsync so a crash
//! never leaves a half-written catalog.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Extension appended to the database name to form the store directory.
pub const STORE_DIR_EXT: &str = "folio";

const MANIFEST_FILE: &str = "MANIFEST";
const MANIFEST_TEMP: &str = "MANIFEST.tmp";
const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "commit.log";
/// Staging name used when rewriting the commit log (compaction, rekey).
const LOG_STAGING: &str = "commit.log.next";

/// Returns the store directory path for a database name under a parent dir.
#[must_use]
pub fn store_path(parent: &Path, name: &str) -> PathBuf {
    parent.join(format!("{name}.{STORE_DIR_EXT}"))
}

/// Manages a store directory and its exclusive lock.
///
/// Only one `StoreDir` instance can exist per directory at a time; a second
/// open attempt fails with [`Error::DatabaseLocked`].
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens or creates a store directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another session holds the lock ([`Error::DatabaseLocked`])
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> Result<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(Error::corruption(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(Error::corruption(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(Error::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the staging path used while rewriting the commit log.
    #[must_use]
    pub fn log_staging_path(&self) -> PathBuf {
        self.path.join(LOG_STAGING)
    }

    /// Atomically replaces the commit log with the staged rewrite.
    ///
    /// The staged file must already be fully written and synced; this
    /// renames it over the live log and fsyncs the directory, so the store
    /// is entirely old or entirely new at every crash point.
    pub fn commit_log_rewrite(&self) -> Result<()> {
        fs::rename(self.log_staging_path(), self.log_path())?;
        self.sync_directory()
    }

    /// Removes a stale staging file left behind by an interrupted rewrite.
    pub fn discard_stale_staging(&self) -> Result<()> {
        let staging = self.log_staging_path();
        if staging.exists() {
            fs::remove_file(&staging)?;
        }
        Ok(())
    }

    /// Returns the path to the MANIFEST file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    /// Checks if this is a new (empty) store directory.
    #[must_use]
    pub fn is_new_store(&self) -> bool {
        !self.manifest_path().exists() && !self.log_path().exists()
    }

    /// Loads the manifest from disk.
    ///
    /// Returns `None` if the manifest file doesn't exist (new store).
    pub fn load_manifest(&self) -> Result<Option<Manifest>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&manifest_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Manifest::decode(&data)?))
    }

    /// Saves the manifest to disk atomically.
    ///
    /// Write-then-rename: write to a temp file, sync it, rename it over
    /// MANIFEST, then fsync the directory so the rename is durable.
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let temp_path = self.path.join(MANIFEST_TEMP);

        let data = manifest.encode()?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.manifest_path())?;
        self.sync_directory()
    }

    /// Syncs the store directory so metadata updates are durable.
    ///
    /// Windows NTFS journals metadata, so the explicit fsync is Unix-only.
    #[cfg(unix)]
    fn sync_directory(&self) -> Result<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> Result<()> {
        Ok(())
    }
}

/// Removes a store directory and all its contents.
///
/// # Errors
///
/// Returns [`Error::DatabaseLocked`] if another session holds the lock, or
/// an I/O error if removal fails. Missing directories are a no-op.
pub fn delete_store(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    // Take the lock briefly so we never delete under a live session.
    let dir = StoreDir::open(path, false)?;
    drop(dir);
    fs::remove_dir_all(path)?;
    Ok(())
}

/// Copies a store directory to a new location via a staging directory.
///
/// The source is locked for the duration, so the copy is a consistent
/// snapshot. The staged copy is renamed into place only once complete.
///
/// # Errors
///
/// Fails with [`Error::DatabaseLocked`] if the source is open elsewhere or
/// [`Error::CollectionAlreadyExists`]-style invalid argument if the target
/// exists.
pub fn copy_store(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        return Err(Error::invalid_argument(format!(
            "target store already exists: {}",
            target.display()
        )));
    }

    // Hold the source lock so no session mutates it mid-copy.
    let source_dir = StoreDir::open(source, false)?;

    let staging = target.with_extension("copying");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    for entry in fs::read_dir(source_dir.path())? {
        let entry = entry?;
        let name = entry.file_name();
        // The lock belongs to the source session, not the copy.
        if name == LOCK_FILE || name == LOG_STAGING {
            continue;
        }
        fs::copy(entry.path(), staging.join(&name))?;
    }

    fs::rename(&staging, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("db.folio");

        let dir = StoreDir::open(&path, true).unwrap();
        assert!(path.is_dir());
        assert!(dir.is_new_store());
    }

    #[test]
    fn open_fails_if_missing_and_no_create() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("absent.folio");
        assert!(StoreDir::open(&path, false).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locked.folio");

        let _dir1 = StoreDir::open(&path, true).unwrap();
        assert!(matches!(
            StoreDir::open(&path, true),
            Err(Error::DatabaseLocked)
        ));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reopen.folio");

        {
            let _dir = StoreDir::open(&path, true).unwrap();
        }
        let _dir2 = StoreDir::open(&path, true).unwrap();
    }

    #[test]
    fn manifest_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("manifest.folio");
        let dir = StoreDir::open(&path, true).unwrap();

        assert!(dir.load_manifest().unwrap().is_none());

        let mut manifest = Manifest::default();
        manifest.create_collection("inventory", "widgets").unwrap();
        dir.save_manifest(&manifest).unwrap();

        let loaded = dir.load_manifest().unwrap().unwrap();
        assert!(loaded.collection("inventory", "widgets").is_some());
    }

    #[test]
    fn copy_store_snapshots_files() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("src.folio");
        let target = temp.path().join("dst.folio");

        {
            let dir = StoreDir::open(&source, true).unwrap();
            dir.save_manifest(&Manifest::default()).unwrap();
            std::fs::write(dir.log_path(), b"log-bytes").unwrap();
        }

        copy_store(&source, &target).unwrap();

        let copied = StoreDir::open(&target, false).unwrap();
        assert!(copied.load_manifest().unwrap().is_some());
        assert_eq!(std::fs::read(copied.log_path()).unwrap(), b"log-bytes");
    }

    #[test]
    fn copy_refuses_locked_source() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("src.folio");
        let target = temp.path().join("dst.folio");

        let _held = StoreDir::open(&source, true).unwrap();
        assert!(matches!(
            copy_store(&source, &target),
            Err(Error::DatabaseLocked)
        ));
    }

    #[test]
    fn delete_store_removes_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("gone.folio");
        {
            let _dir = StoreDir::open(&path, true).unwrap();
        }
        delete_store(&path).unwrap();
        assert!(!path.exists());
        // Deleting again is a no-op.
        delete_store(&path).unwrap();
    }

    #[test]
    fn store_path_naming() {
        let p = store_path(Path::new("/data"), "test");
        assert_eq!(p, Path::new("/data/test.folio"));
    }
}
