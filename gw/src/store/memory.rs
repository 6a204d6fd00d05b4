//! In-process ApplicationStore with injectable latency and failures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ApplicationStore, StoreError};
use crate::domain::{ApplicationRecord, ApplicationStatus, WorkSession};

#[derive(Debug, Default)]
struct Tables {
    applications: HashMap<String, ApplicationRecord>,
    sessions: HashMap<String, WorkSession>,
    rates: HashMap<String, u64>,
}

/// Reference backend kept entirely in memory.
///
/// Latency is applied before any mutation, so a call cancelled by a timeout
/// never changes the tables.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    tables: Mutex<Tables>,
    latency: StdMutex<Duration>,
    offline: AtomicBool,
    failing_writes: AtomicU32,
    failing_status_updates: AtomicU32,
    failing_session_writes: AtomicU32,
    writes: AtomicU64,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        debug!(?latency, "InMemoryApplicationStore::set_latency: called");
        match self.latency.lock() {
            Ok(mut guard) => *guard = latency,
            Err(poisoned) => *poisoned.into_inner() = latency,
        }
    }

    /// Fail every call with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        debug!(offline, "InMemoryApplicationStore::set_offline: called");
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `n` writes with `Unavailable`
    pub fn fail_writes(&self, n: u32) {
        debug!(n, "InMemoryApplicationStore::fail_writes: called");
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` status updates only
    pub fn fail_status_updates(&self, n: u32) {
        debug!(n, "InMemoryApplicationStore::fail_status_updates: called");
        self.failing_status_updates.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` work session writes only
    pub fn fail_session_writes(&self, n: u32) {
        debug!(n, "InMemoryApplicationStore::fail_session_writes: called");
        self.failing_session_writes.store(n, Ordering::SeqCst);
    }

    /// Number of writes that reached the tables
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed a row directly, bypassing latency and failure injection
    pub async fn insert_application(&self, record: ApplicationRecord) {
        debug!(application_id = %record.application_id, "InMemoryApplicationStore::insert_application: called");
        self.tables
            .lock()
            .await
            .applications
            .insert(record.application_id.clone(), record);
    }

    pub async fn set_hourly_rate(&self, job_id: impl Into<String>, cents: u64) {
        self.tables.lock().await.rates.insert(job_id.into(), cents);
    }

    pub async fn application(&self, application_id: &str) -> Option<ApplicationRecord> {
        self.tables.lock().await.applications.get(application_id).cloned()
    }

    pub async fn session(&self, application_id: &str) -> Option<WorkSession> {
        self.tables.lock().await.sessions.get(application_id).cloned()
    }

    pub async fn application_count(&self) -> usize {
        self.tables.lock().await.applications.len()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = match self.latency.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        Ok(())
    }

    async fn enter_write(&self) -> Result<(), StoreError> {
        self.enter().await?;
        if take_one(&self.failing_writes) {
            debug!("InMemoryApplicationStore: injected write failure");
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decrement a failure budget; true if one was available
fn take_one(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn list_applications_for_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        debug!(%user_id, "InMemoryApplicationStore::list_applications_for_user: called");
        self.enter().await?;
        let tables = self.tables.lock().await;
        let mut records: Vec<_> = tables
            .applications
            .values()
            .filter(|r| r.is_party(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then(a.application_id.cmp(&b.application_id)));
        Ok(records)
    }

    async fn get_application(&self, application_id: &str) -> Result<Option<ApplicationRecord>, StoreError> {
        debug!(%application_id, "InMemoryApplicationStore::get_application: called");
        self.enter().await?;
        Ok(self.tables.lock().await.applications.get(application_id).cloned())
    }

    async fn create_application(&self, record: ApplicationRecord) -> Result<(), StoreError> {
        debug!(application_id = %record.application_id, "InMemoryApplicationStore::create_application: called");
        self.enter_write().await?;
        let mut tables = self.tables.lock().await;
        if tables.applications.contains_key(&record.application_id) {
            return Err(StoreError::Rejected(format!(
                "application {} already exists",
                record.application_id
            )));
        }
        tables.applications.insert(record.application_id.clone(), record);
        self.count_write();
        Ok(())
    }

    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        debug!(%application_id, %status, "InMemoryApplicationStore::update_status: called");
        self.enter_write().await?;
        if take_one(&self.failing_status_updates) {
            return Err(StoreError::Unavailable("injected status update failure".to_string()));
        }
        let mut tables = self.tables.lock().await;
        let record = tables
            .applications
            .get_mut(application_id)
            .ok_or_else(|| StoreError::NotFound(format!("application {}", application_id)))?;
        record.status = status;
        record.updated_at = updated_at;
        self.count_write();
        Ok(())
    }

    async fn create_or_update_work_session(&self, session: WorkSession) -> Result<(), StoreError> {
        debug!(application_id = %session.application_id, status = %session.status, "InMemoryApplicationStore::create_or_update_work_session: called");
        self.enter_write().await?;
        if take_one(&self.failing_session_writes) {
            return Err(StoreError::Unavailable("injected session write failure".to_string()));
        }
        self.tables
            .lock()
            .await
            .sessions
            .insert(session.application_id.clone(), session);
        self.count_write();
        Ok(())
    }

    async fn get_work_session(&self, application_id: &str) -> Result<Option<WorkSession>, StoreError> {
        debug!(%application_id, "InMemoryApplicationStore::get_work_session: called");
        self.enter().await?;
        Ok(self.tables.lock().await.sessions.get(application_id).cloned())
    }

    async fn hourly_rate_cents(&self, job_id: &str) -> Result<u64, StoreError> {
        debug!(%job_id, "InMemoryApplicationStore::hourly_rate_cents: called");
        self.enter().await?;
        self.tables
            .lock()
            .await
            .rates
            .get(job_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("hourly rate for job {}", job_id)))
    }
}
