//! Shared database handles with consumer reference counting.

use crate::{SkypeDatabase, StorageError};
use skyp_core::{try_until, OsHandler, SkypConfig, StatusSink};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

pub type SharedDatabase = Arc<Mutex<SkypeDatabase>>;

/// Opaque identity of something holding a database open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Open handles keyed by canonical file path.
pub struct DatabaseRegistry {
    config: SkypConfig,
    sink: Arc<dyn StatusSink>,
    entries: Mutex<BTreeMap<PathBuf, SharedDatabase>>,
}

impl DatabaseRegistry {
    pub fn new(config: SkypConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            config,
            sink,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    /// Returns the open handle for `path`, opening it if needed.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<SharedDatabase, StorageError> {
        let key = Self::key(path.as_ref());
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = entries.get(&key) {
            return Ok(Arc::clone(db));
        }
        let db = SkypeDatabase::open_with(&key, self.config.clone(), Arc::clone(&self.sink))?;
        let db = Arc::new(Mutex::new(db));
        entries.insert(key.clone(), Arc::clone(&db));
        info!(event = "registry_open", path = %key.display());
        Ok(db)
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<SharedDatabase> {
        let key = Self::key(path.as_ref());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    fn with_entry<T>(
        &self,
        path: &Path,
        func: impl FnOnce(&mut SkypeDatabase) -> T,
    ) -> Result<T, StorageError> {
        let db = self
            .get(path)
            .ok_or_else(|| StorageError::Closed(path.to_path_buf()))?;
        let mut db = db.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(func(&mut db))
    }

    pub fn register_consumer(
        &self,
        path: impl AsRef<Path>,
        consumer: ConsumerId,
    ) -> Result<(), StorageError> {
        self.with_entry(path.as_ref(), |db| db.register_consumer(consumer))
    }

    pub fn unregister_consumer(
        &self,
        path: impl AsRef<Path>,
        consumer: ConsumerId,
    ) -> Result<(), StorageError> {
        self.with_entry(path.as_ref(), |db| db.unregister_consumer(consumer))
    }

    pub fn has_consumers(&self, path: impl AsRef<Path>) -> bool {
        self.with_entry(path.as_ref(), |db| db.has_consumers())
            .unwrap_or(false)
    }

    /// Drops the registry's handle unless something still consumes it.
    pub fn close_if_unused(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        if self.has_consumers(path) {
            return Err(StorageError::InUse(path.to_path_buf()));
        }
        let key = Self::key(path);
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        match removed {
            Some(_) => {
                info!(event = "registry_close", path = %key.display());
                Ok(())
            }
            None => Err(StorageError::Closed(path.to_path_buf())),
        }
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Opens a database, asking the Skype client to let go of a locked file
/// and retrying while it does.
pub fn open_with_retry(
    path: impl AsRef<Path>,
    config: &SkypConfig,
    sink: Arc<dyn StatusSink>,
    os_handler: &dyn OsHandler,
) -> Result<SkypeDatabase, StorageError> {
    let path = path.as_ref();
    match SkypeDatabase::open_with(path, config.clone(), Arc::clone(&sink)) {
        Err(err) if err.is_locked() && os_handler.is_running() => {
            warn!(event = "database_locked", path = %path.display());
            sink.status("Closing Skype to release the database file.");
            os_handler.shutdown();
            try_until(
                || SkypeDatabase::open_with(path, config.clone(), Arc::clone(&sink)),
                config.open_retry_count,
                config.open_retry_sleep(),
            )
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_database, SampleChat};
    use rusqlite::Connection;
    use skyp_core::TracingSink;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    struct LockingClient {
        lock: Mutex<Option<Connection>>,
        shutdowns: AtomicUsize,
    }

    impl OsHandler for LockingClient {
        fn launch(&self) -> bool {
            false
        }

        fn shutdown(&self) -> bool {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.lock.lock().expect("lock").take().is_some()
        }

        fn is_running(&self) -> bool {
            self.lock.lock().expect("lock").is_some()
        }
    }

    fn quick_config() -> SkypConfig {
        SkypConfig {
            open_retry_count: 3,
            open_retry_sleep_ms: 10,
            ..SkypConfig::default()
        }
    }

    #[test]
    fn registry_shares_handles_and_counts_consumers() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("left.db");
        drop(sample_database(dir.path(), "left.db", "me", &[SampleChat::new("bob", 1)]));

        let registry = DatabaseRegistry::new(SkypConfig::default(), Arc::new(TracingSink));
        let first = registry.open(&path).expect("open");
        let second = registry.open(dir.path().join(".").join("left.db")).expect("open again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.open_paths().len(), 1);

        let viewer = ConsumerId::next();
        let merger = ConsumerId::next();
        assert_ne!(viewer, merger);
        registry.register_consumer(&path, viewer).expect("register");
        registry.register_consumer(&path, merger).expect("register");
        registry.unregister_consumer(&path, viewer).expect("unregister");
        assert!(registry.has_consumers(&path));
        assert!(matches!(
            registry.close_if_unused(&path),
            Err(StorageError::InUse(_))
        ));

        registry.unregister_consumer(&path, merger).expect("unregister");
        registry.close_if_unused(&path).expect("close");
        assert!(registry.get(&path).is_none());
        assert!(matches!(
            registry.register_consumer(&path, viewer),
            Err(StorageError::Closed(_))
        ));
    }

    #[test]
    fn locked_file_is_released_through_os_handler() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("left.db");
        drop(sample_database(dir.path(), "left.db", "me", &[]));

        let holder = Connection::open(&path).expect("holder");
        holder.execute_batch("BEGIN EXCLUSIVE").expect("exclusive lock");
        let client = LockingClient {
            lock: Mutex::new(Some(holder)),
            shutdowns: AtomicUsize::new(0),
        };

        let locked = SkypeDatabase::open_with(&path, quick_config(), Arc::new(TracingSink))
            .expect_err("locked");
        assert!(locked.is_locked());

        let db = open_with_retry(&path, &quick_config(), Arc::new(TracingSink), &client)
            .expect("open after shutdown");
        assert_eq!(db.id(), Some("me"));
        assert_eq!(client.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_failures_are_not_retried() {
        let dir = tempdir().expect("tempdir");
        let client = LockingClient {
            lock: Mutex::new(None),
            shutdowns: AtomicUsize::new(0),
        };
        let err = open_with_retry(
            dir.path().join("missing.db"),
            &quick_config(),
            Arc::new(TracingSink),
            &client,
        )
        .expect_err("missing");
        assert!(!err.is_locked());
        assert_eq!(client.shutdowns.load(Ordering::SeqCst), 0);
    }
}
