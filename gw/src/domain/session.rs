//! WorkSession domain type
//!
//! A session exists once an application is SELECTED and walks
//! NONE → OTP_GENERATED → WORK_IN_PROGRESS → COMPLETION_PENDING → WORK_COMPLETED.
//! Transition methods return a new value so callers can write it remotely
//! before replacing the old one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::otp::Otp;

/// Work session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Selected, no code issued yet
    #[default]
    None,
    OtpGenerated,
    WorkInProgress,
    CompletionPending,
    WorkCompleted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::OtpGenerated => write!(f, "OTP_GENERATED"),
            Self::WorkInProgress => write!(f, "WORK_IN_PROGRESS"),
            Self::CompletionPending => write!(f, "COMPLETION_PENDING"),
            Self::WorkCompleted => write!(f, "WORK_COMPLETED"),
        }
    }
}

/// The OTP-gated period between selection and verified completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub session_id: String,
    pub application_id: String,
    pub job_id: String,
    pub status: SessionStatus,

    /// Start code; only meaningful while OTP_GENERATED
    #[serde(default)]
    pub otp: Option<Otp>,
    #[serde(default)]
    pub otp_issued_at: Option<DateTime<Utc>>,

    /// Completion code; only meaningful while COMPLETION_PENDING
    #[serde(default)]
    pub completion_otp: Option<Otp>,
    #[serde(default)]
    pub completion_otp_issued_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub hourly_rate_cents: Option<u64>,
    #[serde(default)]
    pub computed_wage_cents: Option<u64>,

    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    /// Create a fresh session for a selected application
    pub fn new(application_id: impl Into<String>, job_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        let application_id = application_id.into();
        let job_id = job_id.into();
        debug!(%application_id, %job_id, "WorkSession::new: called");
        Self {
            session_id: Uuid::now_v7().to_string(),
            application_id,
            job_id,
            status: SessionStatus::None,
            otp: None,
            otp_issued_at: None,
            completion_otp: None,
            completion_otp_issued_at: None,
            started_at: None,
            completed_at: None,
            duration_minutes: None,
            hourly_rate_cents: None,
            computed_wage_cents: None,
            updated_at: now,
        }
    }

    /// The code currently accepted, with its issue time
    pub fn live_otp(&self) -> Option<(&Otp, DateTime<Utc>)> {
        match self.status {
            SessionStatus::OtpGenerated => self.otp.as_ref().zip(self.otp_issued_at),
            SessionStatus::CompletionPending => self.completion_otp.as_ref().zip(self.completion_otp_issued_at),
            _ => None,
        }
    }

    /// Whether work has started (or finished) on this session
    pub fn has_started(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::WorkInProgress | SessionStatus::CompletionPending | SessionStatus::WorkCompleted
        )
    }

    /// Issue a start code, replacing any earlier one
    pub fn issue_start_otp(&self, otp: Otp, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::OtpGenerated,
            otp: Some(otp),
            otp_issued_at: Some(now),
            completion_otp: None,
            completion_otp_issued_at: None,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Start code verified
    pub fn start_work(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::WorkInProgress,
            otp: None,
            otp_issued_at: None,
            started_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Issue the completion code
    pub fn issue_completion_otp(&self, otp: Otp, now: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::CompletionPending,
            otp: None,
            otp_issued_at: None,
            completion_otp: Some(otp),
            completion_otp_issued_at: Some(now),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Completion code verified; records duration and wage
    pub fn complete(&self, now: DateTime<Utc>, hourly_rate_cents: u64) -> Self {
        let minutes = self.started_at.map(|start| duration_minutes(start, now)).unwrap_or(0);
        let wage = compute_wage_cents(hourly_rate_cents, minutes);
        debug!(session_id = %self.session_id, minutes, wage, "WorkSession::complete: called");
        Self {
            status: SessionStatus::WorkCompleted,
            completion_otp: None,
            completion_otp_issued_at: None,
            completed_at: Some(now),
            duration_minutes: Some(minutes),
            hourly_rate_cents: Some(hourly_rate_cents),
            computed_wage_cents: Some(wage),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Drop the live code and step back to the state that can issue a new one
    pub fn revoke_live_otp(&self, now: DateTime<Utc>) -> Self {
        match self.status {
            SessionStatus::OtpGenerated => Self {
                status: SessionStatus::None,
                otp: None,
                otp_issued_at: None,
                updated_at: now,
                ..self.clone()
            },
            SessionStatus::CompletionPending => Self {
                status: SessionStatus::WorkInProgress,
                completion_otp: None,
                completion_otp_issued_at: None,
                updated_at: now,
                ..self.clone()
            },
            _ => self.clone(),
        }
    }
}

/// Whole minutes between two instants, never negative
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

/// Wage for the given minutes at an hourly rate, in cents, rounded down
pub fn compute_wage_cents(hourly_rate_cents: u64, minutes: i64) -> u64 {
    let minutes = u64::try_from(minutes).unwrap_or(0);
    hourly_rate_cents.saturating_mul(minutes) / 60
}

/// Session age helper used for OTP expiry
pub(crate) fn is_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Option<std::time::Duration>) -> bool {
    match ttl.and_then(|ttl| Duration::from_std(ttl).ok()) {
        Some(ttl) => now - issued_at > ttl,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> Otp {
        Otp::parse(s).unwrap()
    }

    #[test]
    fn test_live_otp_follows_status() {
        let now = Utc::now();
        let session = WorkSession::new("app-1", "job-1", now);
        assert!(session.live_otp().is_none());
        assert_eq!(session.updated_at, now);

        let issued = session.issue_start_otp(code("482913"), now);
        assert_eq!(issued.live_otp().unwrap().0.as_str(), "482913");

        let started = issued.start_work(now);
        assert!(started.live_otp().is_none());
        assert!(started.otp.is_none());
        assert_eq!(started.started_at, Some(now));

        let pending = started.issue_completion_otp(code("771204"), now);
        assert_eq!(pending.live_otp().unwrap().0.as_str(), "771204");
    }

    #[test]
    fn test_reissue_replaces_code() {
        let now = Utc::now();
        let first = WorkSession::new("app-1", "job-1", now).issue_start_otp(code("111111"), now);
        let second = first.issue_start_otp(code("222222"), now);
        assert_eq!(second.live_otp().unwrap().0.as_str(), "222222");
        assert_eq!(second.session_id, first.session_id);
    }

    #[test]
    fn test_complete_computes_wage() {
        let start = Utc::now() - Duration::minutes(90);
        let session = WorkSession::new("app-1", "job-1", start)
            .issue_start_otp(code("111111"), start)
            .start_work(start)
            .issue_completion_otp(code("222222"), Utc::now());
        let done = session.complete(start + Duration::minutes(90), 2000);

        assert_eq!(done.status, SessionStatus::WorkCompleted);
        assert_eq!(done.duration_minutes, Some(90));
        assert_eq!(done.computed_wage_cents, Some(3000));
        assert!(done.live_otp().is_none());
    }

    #[test]
    fn test_revoke_steps_back() {
        let now = Utc::now();
        let issued = WorkSession::new("app-1", "job-1", now).issue_start_otp(code("111111"), now);
        assert_eq!(issued.revoke_live_otp(now).status, SessionStatus::None);

        let pending = issued.start_work(now).issue_completion_otp(code("222222"), now);
        let revoked = pending.revoke_live_otp(now);
        assert_eq!(revoked.status, SessionStatus::WorkInProgress);
        assert!(revoked.completion_otp.is_none());
    }

    #[test]
    fn test_duration_never_negative() {
        let now = Utc::now();
        assert_eq!(duration_minutes(now, now - Duration::minutes(3)), 0);
        assert_eq!(compute_wage_cents(1500, -4), 0);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let ttl = Some(std::time::Duration::from_secs(60));
        assert!(!is_expired(now - Duration::seconds(30), now, ttl));
        assert!(is_expired(now - Duration::seconds(61), now, ttl));
        assert!(!is_expired(now - Duration::days(3), now, None));
    }
}
