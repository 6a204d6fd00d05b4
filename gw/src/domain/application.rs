//! ApplicationRecord domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::status::ApplicationStatus;

/// One application of an employee to a job
///
/// The remote store can hold several rows for the same (job, employee)
/// pair; the one with the latest `updated_at` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub application_id: String,
    pub job_id: String,
    pub employee_id: String,
    pub employer_id: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Create a new record with a generated ID
    pub fn new(
        job_id: impl Into<String>,
        employee_id: impl Into<String>,
        employer_id: impl Into<String>,
        status: ApplicationStatus,
    ) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), job_id, employee_id, employer_id, status)
    }

    /// Create with a specific ID (for testing or recovery)
    pub fn with_id(
        application_id: impl Into<String>,
        job_id: impl Into<String>,
        employee_id: impl Into<String>,
        employer_id: impl Into<String>,
        status: ApplicationStatus,
    ) -> Self {
        let now = Utc::now();
        let record = Self {
            application_id: application_id.into(),
            job_id: job_id.into(),
            employee_id: employee_id.into(),
            employer_id: employer_id.into(),
            status,
            applied_at: now,
            updated_at: now,
        };
        debug!(application_id = %record.application_id, job_id = %record.job_id, %status, "ApplicationRecord::with_id: called");
        record
    }

    /// Builder method to back-date a record (historical rows, tests)
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.applied_at = at;
        self.updated_at = at;
        self
    }

    /// Copy of this record with a new status; status and `updated_at` always move together
    pub fn with_status(&self, status: ApplicationStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: at,
            ..self.clone()
        }
    }

    /// Whether the user is the employee or employer on this record
    pub fn is_party(&self, user_id: &str) -> bool {
        self.employee_id == user_id || self.employer_id == user_id
    }

    /// Newer of two rows for the same job; ties go to the later application
    pub fn is_newer_than(&self, other: &ApplicationRecord) -> bool {
        (self.updated_at, self.applied_at, &self.application_id)
            > (other.updated_at, other.applied_at, &other.application_id)
    }
}
