//! WorkSessionManager - OTP-gated start and completion of work
//!
//! Every operation reads the authoritative application and session from the
//! remote store, so two devices (employer and employee) see the same live
//! code. Steps that change both the session and the application write the
//! session first and restore it if the application write fails.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::InteractionCache;
use crate::domain::{
    ApplicationRecord, ApplicationStatus, Clock, Identity, Otp, OtpGenerator, SessionStatus, UserContext, WorkSession,
    is_expired,
};
use crate::error::{CoreError, CoreResult};
use crate::machine::{ApplicationStateMachine, check_work_transition};
use crate::policy::Policies;
use crate::store::ApplicationStore;

use super::OtpSettings;
use super::attempts::OtpAttempts;

/// Handle to work-session operations; clones share state
#[derive(Clone)]
pub struct WorkSessionManager {
    store: Arc<dyn ApplicationStore>,
    machine: ApplicationStateMachine,
    cache: InteractionCache,
    user: UserContext,
    generator: Arc<dyn OtpGenerator>,
    clock: Arc<dyn Clock>,
    policies: Policies,
    settings: OtpSettings,
    attempts: Arc<OtpAttempts>,
    ops: Arc<Mutex<()>>,
}

impl WorkSessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        machine: ApplicationStateMachine,
        cache: InteractionCache,
        user: UserContext,
        generator: Arc<dyn OtpGenerator>,
        clock: Arc<dyn Clock>,
        policies: Policies,
        settings: OtpSettings,
    ) -> Self {
        debug!(?settings, "WorkSessionManager::new: called");
        Self {
            store,
            machine,
            cache,
            user,
            generator,
            clock,
            policies,
            attempts: Arc::new(OtpAttempts::new(settings.max_attempts)),
            settings,
            ops: Arc::new(Mutex::new(())),
        }
    }

    /// Current session of an application, if one exists
    pub async fn session(&self, application_id: &str) -> CoreResult<Option<WorkSession>> {
        debug!(%application_id, "session: called");
        let (_, record) = self.context(application_id).await?;
        self.load_session(&record.application_id).await
    }

    /// Issue a start code for a selected application, replacing any earlier one
    pub async fn generate_start_otp(&self, application_id: &str) -> CoreResult<Otp> {
        debug!(%application_id, "generate_start_otp: called");
        let _guard = self.ops.lock().await;
        let (identity, record) = self.context(application_id).await?;
        if !record.status.is_selected() {
            return Err(CoreError::Validation(format!(
                "a start OTP needs a SELECTED application, {} is {}",
                application_id, record.status
            )));
        }

        let session = match self.load_session(application_id).await? {
            Some(session) => session,
            None => {
                debug!(%application_id, "generate_start_otp: no session yet, creating one");
                WorkSession::new(&record.application_id, &record.job_id, self.clock.now())
            }
        };
        if session.has_started() {
            return Err(CoreError::Validation(format!(
                "work on {} has already started",
                application_id
            )));
        }

        let otp = self.generator.generate();
        let next = session.issue_start_otp(otp.clone(), self.clock.now());
        self.write_session(&next).await?;
        self.attempts.clear(application_id);

        info!(%application_id, session_id = %next.session_id, "Start OTP issued");
        self.touch_cache(&identity, &record).await;
        Ok(otp)
    }

    /// Check the start code and begin work
    pub async fn verify_start_otp(&self, application_id: &str, entered: &str) -> CoreResult<WorkSession> {
        debug!(%application_id, "verify_start_otp: called");
        let code = Otp::parse(entered)?;
        let _guard = self.ops.lock().await;
        let (identity, record) = self.context(application_id).await?;
        let now = self.clock.now();

        let session = self.live_session(application_id, SessionStatus::OtpGenerated).await?;
        self.check_code(&session, &code, now).await?;
        check_work_transition(record.status, ApplicationStatus::WorkInProgress)?;

        let next = session.start_work(now);
        self.write_both(&session, &next, &record, ApplicationStatus::WorkInProgress, now)
            .await?;
        self.attempts.clear(application_id);

        info!(%application_id, started_at = %now, "Work started");
        self.touch_cache(&identity, &record).await;
        Ok(next)
    }

    /// Issue the completion code for work in progress
    pub async fn request_completion(&self, application_id: &str) -> CoreResult<Otp> {
        debug!(%application_id, "request_completion: called");
        let _guard = self.ops.lock().await;
        let (identity, record) = self.context(application_id).await?;
        let now = self.clock.now();

        let in_progress = matches!(
            record.status,
            ApplicationStatus::WorkInProgress | ApplicationStatus::CompletionPending
        );
        let session = self
            .load_session(application_id)
            .await?
            .filter(|s| matches!(s.status, SessionStatus::WorkInProgress | SessionStatus::CompletionPending));
        let session = match (in_progress, session) {
            (true, Some(session)) => session,
            _ => {
                return Err(CoreError::Validation(format!(
                    "completion needs work in progress, {} is {}",
                    application_id, record.status
                )));
            }
        };

        let otp = self.generator.generate();
        let next = session.issue_completion_otp(otp.clone(), now);
        if record.status == ApplicationStatus::WorkInProgress {
            self.write_both(&session, &next, &record, ApplicationStatus::CompletionPending, now)
                .await?;
        } else {
            // Re-issue: the application is already COMPLETION_PENDING
            self.write_session(&next).await?;
        }
        self.attempts.clear(application_id);

        info!(%application_id, "Completion OTP issued");
        self.touch_cache(&identity, &record).await;
        Ok(otp)
    }

    /// Check the completion code, record duration and wage, and finish the session
    pub async fn verify_completion_otp(&self, application_id: &str, entered: &str) -> CoreResult<WorkSession> {
        debug!(%application_id, "verify_completion_otp: called");
        let code = Otp::parse(entered)?;
        let _guard = self.ops.lock().await;
        let (identity, record) = self.context(application_id).await?;
        let now = self.clock.now();

        let session = self
            .live_session(application_id, SessionStatus::CompletionPending)
            .await?;
        self.check_code(&session, &code, now).await?;
        check_work_transition(record.status, ApplicationStatus::Completed)?;

        let rate = self
            .policies
            .remote_read
            .run("hourly_rate_cents", || self.store.hourly_rate_cents(&record.job_id))
            .await?;
        let next = session.complete(now, rate);
        self.write_both(&session, &next, &record, ApplicationStatus::Completed, now)
            .await?;
        self.attempts.clear(application_id);

        info!(
            %application_id,
            duration_minutes = next.duration_minutes.unwrap_or(0),
            wage_cents = next.computed_wage_cents.unwrap_or(0),
            "Work completed"
        );
        self.touch_cache(&identity, &record).await;
        Ok(next)
    }

    // === Helpers ===

    /// Signed-in user and the authoritative application they are a party to
    async fn context(&self, application_id: &str) -> CoreResult<(Identity, ApplicationRecord)> {
        let identity = self.user.require()?;
        let record = self.machine.fetch(application_id).await?;
        Ok((identity, record))
    }

    async fn load_session(&self, application_id: &str) -> CoreResult<Option<WorkSession>> {
        let session = self
            .policies
            .remote_read
            .run("get_work_session", || self.store.get_work_session(application_id))
            .await?;
        Ok(session)
    }

    /// Session holding a live code in the expected status, or Conflict
    async fn live_session(&self, application_id: &str, expected: SessionStatus) -> CoreResult<WorkSession> {
        match self.load_session(application_id).await? {
            Some(session) if session.status == expected && session.live_otp().is_some() => Ok(session),
            Some(session) => {
                debug!(%application_id, status = %session.status, %expected, "live_session: no live OTP");
                Err(CoreError::Conflict(format!("no live OTP for {}", application_id)))
            }
            None => Err(CoreError::Conflict(format!("no work session for {}", application_id))),
        }
    }

    /// Compare against the live code, enforcing expiry and the attempt limit
    async fn check_code(&self, session: &WorkSession, code: &Otp, now: DateTime<Utc>) -> CoreResult<()> {
        let application_id = &session.application_id;
        let Some((live, issued_at)) = session.live_otp() else {
            return Err(CoreError::Conflict(format!("no live OTP for {}", application_id)));
        };
        if is_expired(issued_at, now, self.settings.ttl) {
            debug!(%application_id, %issued_at, "check_code: OTP expired");
            return Err(CoreError::Conflict(format!(
                "OTP for {} has expired, request a new one",
                application_id
            )));
        }
        if self.attempts.is_locked_out(application_id, issued_at) {
            return Err(CoreError::Conflict(format!(
                "too many wrong codes for {}, request a new OTP",
                application_id
            )));
        }
        if live.matches(code) {
            return Ok(());
        }

        let failure = self.attempts.record_failure(application_id, issued_at);
        warn!(%application_id, attempts_left = ?failure.attempts_left, "OTP mismatch");
        if failure.locked_out {
            let revoked = session.revoke_live_otp(now);
            if let Err(e) = self.write_session(&revoked).await {
                warn!(%application_id, error = %e, "Could not revoke locked-out OTP remotely");
            }
        }
        Err(CoreError::OtpMismatch {
            attempts_left: failure.attempts_left,
        })
    }

    async fn write_session(&self, session: &WorkSession) -> CoreResult<()> {
        self.policies
            .remote_write
            .run("create_or_update_work_session", || {
                self.store.create_or_update_work_session(session.clone())
            })
            .await?;
        Ok(())
    }

    /// Write the session, then the application status; undo the session write on failure
    async fn write_both(
        &self,
        previous: &WorkSession,
        next: &WorkSession,
        record: &ApplicationRecord,
        to: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.write_session(next).await?;
        if let Err(e) = self.machine.advance_work(record, to, now).await {
            warn!(application_id = %record.application_id, %to, error = %e, "Status write failed, restoring work session");
            if let Err(undo) = self.write_session(previous).await {
                warn!(application_id = %record.application_id, error = %undo, "Could not restore work session");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Work-session jobs stay in the applied bucket of the employee's cache
    async fn touch_cache(&self, identity: &Identity, record: &ApplicationRecord) {
        if identity.user_id != record.employee_id {
            return;
        }
        if let Err(e) = self.cache.mark_applied(&record.job_id).await {
            warn!(job_id = %record.job_id, error = %e, "Cache write-through failed");
        }
    }
}
