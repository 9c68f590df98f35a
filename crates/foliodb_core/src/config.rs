//! Database configuration.

use foliodb_storage::EncryptionKey;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Directory under which the database's store directory is created.
    /// Defaults to [`crate::Database::default_directory`].
    pub directory: Option<PathBuf>,

    /// Encryption key for at-rest encryption. `None` stores data in plain.
    pub encryption_key: Option<EncryptionKey>,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the commit log on every write (safer but slower).
    pub sync_on_commit: bool,

    /// How often the background sweep reclaims expired documents.
    pub expiry_sweep_interval: Duration,

    /// Format version to use for new stores.
    pub format_version: (u16, u16),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            directory: None,
            encryption_key: None,
            create_if_missing: true,
            sync_on_commit: true,
            expiry_sweep_interval: Duration::from_secs(1),
            format_version: (1, 0),
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the parent directory for the store.
    #[must_use]
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Sets the at-rest encryption key.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the commit log on every write.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the expired-document sweep interval.
    #[must_use]
    pub const fn expiry_sweep_interval(mut self, interval: Duration) -> Self {
        self.expiry_sweep_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DatabaseConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert!(config.encryption_key.is_none());
        assert!(config.directory.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = DatabaseConfig::new()
            .directory("/tmp/dbs")
            .create_if_missing(false)
            .sync_on_commit(false)
            .expiry_sweep_interval(Duration::from_millis(50));

        assert_eq!(config.directory.as_deref(), Some(std::path::Path::new("/tmp/dbs")));
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(config.expiry_sweep_interval, Duration::from_millis(50));
    }
}
