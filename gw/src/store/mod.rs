//! Remote stores the core depends on
//!
//! The application store is row-level CRUD owned by a backend; the
//! reconsideration store persists job ids that were already re-offered.
//! Both are traits so the client can be wired against any backend.

mod memory;
mod reconsideration;

pub use memory::InMemoryApplicationStore;
pub use reconsideration::{FileReconsiderationStore, MemoryReconsiderationStore, ReconsiderationStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ApplicationRecord, ApplicationStatus, WorkSession};
use crate::policy::Transient;

/// Errors reported by a remote store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or failing; retrying may help
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend refused the write (duplicate key, constraint)
    #[error("Store rejected write: {0}")]
    Rejected(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Remote application and work-session store
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Every application row where the user is employee or employer,
    /// including superseded historical rows
    async fn list_applications_for_user(&self, user_id: &str) -> Result<Vec<ApplicationRecord>, StoreError>;

    async fn get_application(&self, application_id: &str) -> Result<Option<ApplicationRecord>, StoreError>;

    /// Insert a new row; an existing `application_id` is rejected
    async fn create_application(&self, record: ApplicationRecord) -> Result<(), StoreError>;

    /// Set status and `updated_at` together
    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn create_or_update_work_session(&self, session: WorkSession) -> Result<(), StoreError>;

    async fn get_work_session(&self, application_id: &str) -> Result<Option<WorkSession>, StoreError>;

    /// Hourly rate of a job in cents
    async fn hourly_rate_cents(&self, job_id: &str) -> Result<u64, StoreError>;
}
