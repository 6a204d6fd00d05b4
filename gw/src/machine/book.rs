//! ApplicationStateMachine - local book of application records
//!
//! Owns the canonical status of every application the signed-in user is a
//! party to. Employee swipes and applications commit locally and reach the
//! remote store through background write-through; employer decisions and
//! OTP-gated steps wait for the remote store before committing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, InteractionCache, MarkAs};
use crate::domain::{Actor, ApplicationRecord, ApplicationStatus, Clock, UserContext, WorkSession};
use crate::error::{CoreError, CoreResult};
use crate::policy::{Policies, RetryPolicy};
use crate::store::ApplicationStore;
use crate::writeback::WriteBack;

use super::rules::{check_new_application, check_transition, check_work_transition, normalize_employer_request};

/// A remote write produced by a committed transition
#[derive(Debug, Clone)]
enum RemoteWrite {
    Create(ApplicationRecord),
    Status {
        application_id: String,
        status: ApplicationStatus,
        updated_at: DateTime<Utc>,
    },
}

impl RemoteWrite {
    fn status_of(record: &ApplicationRecord) -> Self {
        Self::Status {
            application_id: record.application_id.clone(),
            status: record.status,
            updated_at: record.updated_at,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            Self::Create(_) => "create_application",
            Self::Status { .. } => "update_status",
        }
    }

    async fn send(&self, store: &dyn ApplicationStore, policy: RetryPolicy) -> CoreResult<()> {
        match self {
            Self::Create(record) => {
                policy
                    .run(self.operation(), || store.create_application(record.clone()))
                    .await?
            }
            Self::Status {
                application_id,
                status,
                updated_at,
            } => {
                policy
                    .run(self.operation(), || store.update_status(application_id, *status, *updated_at))
                    .await?
            }
        }
        Ok(())
    }
}

/// Handle to the application book; clones share state
#[derive(Clone)]
pub struct ApplicationStateMachine {
    records: Arc<RwLock<HashMap<String, ApplicationRecord>>>,
    ops: Arc<Mutex<()>>,
    store: Arc<dyn ApplicationStore>,
    cache: InteractionCache,
    user: UserContext,
    writeback: WriteBack,
    policies: Policies,
    clock: Arc<dyn Clock>,
}

impl ApplicationStateMachine {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        cache: InteractionCache,
        user: UserContext,
        writeback: WriteBack,
        policies: Policies,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!("ApplicationStateMachine::new: called");
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            ops: Arc::new(Mutex::new(())),
            store,
            cache,
            user,
            writeback,
            policies,
            clock,
        }
    }

    // === Reads ===

    pub fn get(&self, application_id: &str) -> Option<ApplicationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(application_id)
            .cloned()
    }

    /// Authoritative (most recently updated) record of an employee for a job
    pub fn latest_for_job(&self, job_id: &str, employee_id: &str) -> Option<ApplicationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.job_id == job_id && r.employee_id == employee_id)
            .fold(None, |best: Option<&ApplicationRecord>, r| match best {
                Some(b) if !r.is_newer_than(b) => Some(b),
                _ => Some(r),
            })
            .cloned()
    }

    /// Every record in the book, oldest application first
    pub fn records(&self) -> Vec<ApplicationRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.applied_at.cmp(&b.applied_at).then(a.application_id.cmp(&b.application_id)));
        records
    }

    /// Remote record, refreshed into the book; the caller must be a party to it
    pub async fn fetch(&self, application_id: &str) -> CoreResult<ApplicationRecord> {
        debug!(%application_id, "fetch: called");
        let identity = self.user.require()?;
        let record = self
            .policies
            .remote_read
            .run("get_application", || self.store.get_application(application_id))
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("application {}", application_id)))?;
        if !record.is_party(&identity.user_id) {
            return Err(CoreError::Authorization(format!(
                "user {} is not a party to application {}",
                identity.user_id, application_id
            )));
        }
        self.merge(std::slice::from_ref(&record));
        Ok(record)
    }

    // === Employee transitions ===

    /// Apply to a job, or re-apply after a rejection with a new record
    pub async fn apply(&self, job_id: &str, employer_id: &str) -> CoreResult<ApplicationRecord> {
        debug!(%job_id, %employer_id, "apply: called");
        let identity = self.user.require_role(Actor::Employee)?;
        require_id("job id", job_id)?;
        require_id("employer id", employer_id)?;

        let _guard = self.ops.lock().await;
        let latest = self.latest_for_job(job_id, &identity.user_id);
        check_new_application(latest.as_ref().map(|r| r.status))?;

        if self.consumes_reconsideration(job_id) {
            self.cache.resolve_reconsideration(job_id, MarkAs::Applied).await?;
        } else {
            self.cache.mark_applied(job_id).await?;
        }

        let record = ApplicationRecord::new(job_id, &identity.user_id, employer_id, ApplicationStatus::Applied)
            .at(self.clock.now());
        self.insert(record.clone());
        info!(application_id = %record.application_id, %job_id, "Applied to job");
        self.write_through(RemoteWrite::Create(record.clone())).await;
        Ok(record)
    }

    /// Swipe a job away; never waits for the network
    pub async fn mark_not_interested(&self, job_id: &str, employer_id: &str) -> CoreResult<ApplicationRecord> {
        debug!(%job_id, "mark_not_interested: called");
        let identity = self.user.require_role(Actor::Employee)?;
        require_id("job id", job_id)?;
        require_id("employer id", employer_id)?;

        let _guard = self.ops.lock().await;
        let latest = self.latest_for_job(job_id, &identity.user_id);
        if let Some(active) = latest.as_ref().filter(|r| !r.status.is_reapplicable()) {
            return Err(CoreError::Validation(format!(
                "application {} is {}; decline it instead",
                active.application_id, active.status
            )));
        }

        if self.consumes_reconsideration(job_id) {
            self.cache.resolve_reconsideration(job_id, MarkAs::Rejected).await?;
        } else {
            match self.cache.mark_rejected_fast(job_id) {
                Ok(()) => {}
                Err(CacheError::Busy) => self.cache.mark_rejected(job_id).await?,
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(existing) = latest.filter(|r| r.status == ApplicationStatus::NotInterested) {
            debug!(application_id = %existing.application_id, "mark_not_interested: already recorded");
            return Ok(existing);
        }
        let record = ApplicationRecord::new(job_id, &identity.user_id, employer_id, ApplicationStatus::NotInterested)
            .at(self.clock.now());
        self.insert(record.clone());
        self.write_through(RemoteWrite::Create(record.clone())).await;
        Ok(record)
    }

    /// Turn down a selection
    pub async fn decline(&self, application_id: &str) -> CoreResult<ApplicationRecord> {
        debug!(%application_id, "decline: called");
        let identity = self.user.require_role(Actor::Employee)?;

        let _guard = self.ops.lock().await;
        let record = self.owned_record(application_id, &identity.user_id, Actor::Employee)?;
        check_transition(Actor::Employee, record.status, ApplicationStatus::Declined)?;

        self.cache.mark_rejected(&record.job_id).await?;
        let next = record.with_status(ApplicationStatus::Declined, self.clock.now());
        self.insert(next.clone());
        info!(%application_id, "Selection declined");
        self.write_through(RemoteWrite::status_of(&next)).await;
        Ok(next)
    }

    // === Employer transitions ===

    /// Select or reject an applicant; waits for the remote store.
    ///
    /// Any requested status other than SELECTED or REJECTED is treated as
    /// REJECTED. Selecting also creates the work session; if that write
    /// fails the remote status is put back.
    pub async fn employer_decide(
        &self,
        application_id: &str,
        requested: ApplicationStatus,
    ) -> CoreResult<ApplicationRecord> {
        debug!(%application_id, %requested, "employer_decide: called");
        let identity = self.user.require_role(Actor::Employer)?;
        let status = normalize_employer_request(requested);

        let _guard = self.ops.lock().await;
        let record = match self.get(application_id) {
            Some(record) => record,
            None => self.fetch(application_id).await?,
        };
        if record.employer_id != identity.user_id {
            return Err(not_owner(&identity.user_id, application_id));
        }
        check_transition(Actor::Employer, record.status, status)?;

        let next = record.with_status(status, self.clock.now());
        RemoteWrite::status_of(&next)
            .send(self.store.as_ref(), self.policies.remote_write)
            .await?;
        if status == ApplicationStatus::Selected {
            let session = WorkSession::new(&next.application_id, &next.job_id, next.updated_at);
            let created = self
                .policies
                .remote_write
                .run("create_or_update_work_session", || {
                    self.store.create_or_update_work_session(session.clone())
                })
                .await;
            if let Err(e) = created {
                warn!(%application_id, error = %e, "Work session write failed, restoring status");
                if let Err(restore) = RemoteWrite::status_of(&record)
                    .send(self.store.as_ref(), self.policies.remote_write)
                    .await
                {
                    warn!(%application_id, error = %restore, "Status restore failed");
                }
                return Err(e.into());
            }
        }

        self.insert(next.clone());
        info!(%application_id, %status, "Employer decision recorded");
        Ok(next)
    }

    // === OTP-gated steps (driven by the session manager) ===

    /// Write an OTP-gated status remotely, then commit it locally
    pub(crate) async fn advance_work(
        &self,
        record: &ApplicationRecord,
        to: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<ApplicationRecord> {
        debug!(application_id = %record.application_id, from = %record.status, %to, "advance_work: called");
        check_work_transition(record.status, to)?;
        let next = record.with_status(to, now);
        RemoteWrite::status_of(&next)
            .send(self.store.as_ref(), self.policies.remote_write)
            .await?;
        self.insert(next.clone());
        Ok(next)
    }

    // === Sync support ===

    /// The book as it would look after merging `incoming`, without changing it
    pub fn merged_with(&self, incoming: &[ApplicationRecord]) -> Vec<ApplicationRecord> {
        let mut merged = self.records.read().unwrap_or_else(PoisonError::into_inner).clone();
        merge_into(&mut merged, incoming);
        merged.into_values().collect()
    }

    /// Merge remote rows; a row replaces the local copy only if it is newer.
    /// Local-only rows are kept until the remote store has them.
    pub fn merge(&self, incoming: &[ApplicationRecord]) {
        debug!(count = incoming.len(), "merge: called");
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        merge_into(&mut records, incoming);
    }

    pub fn clear(&self) {
        debug!("ApplicationStateMachine::clear: called");
        self.records.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    // === Helpers ===

    fn insert(&self, record: ApplicationRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.application_id.clone(), record);
    }

    fn consumes_reconsideration(&self, job_id: &str) -> bool {
        let snapshot = self.cache.snapshot();
        snapshot.is_reconsideration_mode() && snapshot.is_rejected(job_id) && !snapshot.is_reconsidered(job_id)
    }

    fn owned_record(&self, application_id: &str, user_id: &str, actor: Actor) -> CoreResult<ApplicationRecord> {
        let record = self
            .get(application_id)
            .ok_or_else(|| CoreError::NotFound(format!("application {}", application_id)))?;
        let owner = match actor {
            Actor::Employee => &record.employee_id,
            Actor::Employer => &record.employer_id,
        };
        if owner != user_id {
            return Err(not_owner(user_id, application_id));
        }
        Ok(record)
    }

    async fn write_through(&self, write: RemoteWrite) {
        let store = self.store.clone();
        let policy = self.policies.remote_write;
        self.writeback
            .spawn(write.operation(), async move { write.send(store.as_ref(), policy).await })
            .await;
    }
}

fn merge_into(records: &mut HashMap<String, ApplicationRecord>, incoming: &[ApplicationRecord]) {
    for record in incoming {
        let replace = records
            .get(&record.application_id)
            .is_none_or(|local| record.updated_at >= local.updated_at);
        if replace {
            records.insert(record.application_id.clone(), record.clone());
        }
    }
}

fn require_id(what: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} must not be blank", what)));
    }
    Ok(())
}

fn not_owner(user_id: &str, application_id: &str) -> CoreError {
    CoreError::Authorization(format!(
        "user {} does not own application {}",
        user_id, application_id
    ))
}
