use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Why the key-value store could not be used
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Local key-value storage for serialized filter snapshots.
/// Lets the listing run against disk, memory or anything else.
#[async_trait]
pub trait FilterStore: Send + Sync {
    /// Read the raw value stored under `key`, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Short name used in logs
    fn store_name(&self) -> &'static str;
}

/// Distinguishes concurrent writes to the same key
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl FilterStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a reader never sees half a snapshot
        let path = self.path_for(key);
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{key}.json.{}.{seq}.tmp", std::process::id()));
        if let Err(err) = tokio::fs::write(&tmp, value).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

/// Process-local store, also used to simulate disabled storage in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every read and write
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::default(),
            unavailable: true,
        }
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        self
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.unavailable {
            Err(PersistenceError::Unavailable("storage disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FilterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.check()?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| PersistenceError::Unavailable("store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.check()?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| PersistenceError::Unavailable("store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_store_missing_key_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path());
        assert!(store.get("filters").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_creates_directory_and_overwrites() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested"));

        store.set("filters", r#"{"status":"rent"}"#).await.unwrap();
        store.set("filters", r#"{"status":"sale"}"#).await.unwrap();

        let raw = store.get("filters").await.unwrap();
        assert_eq!(raw.as_deref(), Some(r#"{"status":"sale"}"#));
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_key_all_succeed() {
        let dir = tempdir().expect("tempdir");
        let store = std::sync::Arc::new(FileStore::new(dir.path()));

        let writes: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let status = if i % 2 == 0 { "rent" } else { "sale" };
                    store.set("filters", &format!(r#"{{"status":"{status}"}}"#)).await
                })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        let raw = store.get("filters").await.unwrap().unwrap();
        assert!(raw == r#"{"status":"rent"}"# || raw == r#"{"status":"sale"}"#);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn unavailable_memory_store_refuses_everything() {
        let store = MemoryStore::unavailable();
        assert!(matches!(
            store.get("filters").await,
            Err(PersistenceError::Unavailable(_))
        ));
        assert!(store.set("filters", "{}").await.is_err());
    }
}
