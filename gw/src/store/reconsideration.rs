//! Persisted set of job ids already offered for reconsideration

use async_trait::async_trait;
use keyset::{KeySet, KeySetError};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::StoreError;

#[async_trait]
pub trait ReconsiderationStore: Send + Sync {
    async fn load(&self) -> Result<HashSet<String>, StoreError>;

    async fn append(&self, job_id: &str) -> Result<(), StoreError>;

    async fn append_batch(&self, job_ids: &[String]) -> Result<(), StoreError>;
}

impl From<KeySetError> for StoreError {
    fn from(e: KeySetError) -> Self {
        match e {
            KeySetError::BlankKey => StoreError::Rejected(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// File-backed store over a [`KeySet`]; disk work runs on the blocking pool
#[derive(Debug, Clone)]
pub struct FileReconsiderationStore {
    set: Arc<KeySet>,
}

impl FileReconsiderationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(path = %path.as_ref().display(), "FileReconsiderationStore::open: called");
        Ok(Self {
            set: Arc::new(KeySet::open(path)?),
        })
    }

    pub fn path(&self) -> &Path {
        self.set.path()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&KeySet) -> Result<T, KeySetError> + Send + 'static,
    {
        let set = self.set.clone();
        tokio::task::spawn_blocking(move || f(&set))
            .await
            .map_err(|e| StoreError::Unavailable(format!("keyset task failed: {}", e)))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl ReconsiderationStore for FileReconsiderationStore {
    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        debug!("FileReconsiderationStore::load: called");
        let keys = self.blocking(|set| set.load()).await?;
        Ok(keys.into_iter().collect())
    }

    async fn append(&self, job_id: &str) -> Result<(), StoreError> {
        debug!(%job_id, "FileReconsiderationStore::append: called");
        let key = job_id.to_string();
        self.blocking(move |set| set.append(&key)).await?;
        Ok(())
    }

    async fn append_batch(&self, job_ids: &[String]) -> Result<(), StoreError> {
        debug!(count = job_ids.len(), "FileReconsiderationStore::append_batch: called");
        let keys = job_ids.to_vec();
        let added = self.blocking(move |set| set.append_batch(keys)).await?;
        debug!(added, "FileReconsiderationStore::append_batch: done");
        Ok(())
    }
}

/// Ephemeral store for tests and guest sessions
#[derive(Debug, Default)]
pub struct MemoryReconsiderationStore {
    ids: Mutex<HashSet<String>>,
    offline: AtomicBool,
}

impl MemoryReconsiderationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn ids(&self) -> HashSet<String> {
        match self.ids.lock() {
            Ok(ids) => ids.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reconsideration store is offline".to_string()));
        }
        Ok(())
    }

    fn insert_all<'a>(&self, job_ids: impl IntoIterator<Item = &'a str>) -> Result<(), StoreError> {
        let job_ids: Vec<&str> = job_ids.into_iter().collect();
        if job_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(StoreError::Rejected("blank job id".to_string()));
        }
        let mut ids = match self.ids.lock() {
            Ok(ids) => ids,
            Err(poisoned) => poisoned.into_inner(),
        };
        ids.extend(job_ids.into_iter().map(str::to_string));
        Ok(())
    }
}

#[async_trait]
impl ReconsiderationStore for MemoryReconsiderationStore {
    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        self.check_online()?;
        Ok(self.ids())
    }

    async fn append(&self, job_id: &str) -> Result<(), StoreError> {
        self.check_online()?;
        self.insert_all([job_id])
    }

    async fn append_batch(&self, job_ids: &[String]) -> Result<(), StoreError> {
        self.check_online()?;
        self.insert_all(job_ids.iter().map(String::as_str))
    }
}
