//! Application status and per-job outcome

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Status assigned to status strings that match no known spelling.
///
/// REJECTED keeps an unreadable row out of every work-session path (no OTP
/// can be issued for it) while still letting the job be reconsidered once.
pub const UNRECOGNIZED_STATUS_DEFAULT: ApplicationStatus = ApplicationStatus::Rejected;

/// Canonical status of a job application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    /// Employee applied
    Applied,
    Shortlisted,
    InterviewScheduled,
    Reviewing,
    /// Employer picked this applicant; a work session exists from here on
    Selected,
    /// Legacy synonym of Selected
    Accepted,
    /// Employee turned down a selection
    Declined,
    /// Employer turned the applicant down
    Rejected,
    /// Employee swiped the job away
    NotInterested,
    WorkInProgress,
    CompletionPending,
    Completed,
}

/// Strict parse failure for canonical status names
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown application status: {0}")]
pub struct UnknownStatus(pub String);

impl ApplicationStatus {
    /// Every status, in lifecycle order
    pub const ALL: [ApplicationStatus; 12] = [
        Self::Applied,
        Self::Shortlisted,
        Self::InterviewScheduled,
        Self::Reviewing,
        Self::Selected,
        Self::Accepted,
        Self::Declined,
        Self::Rejected,
        Self::NotInterested,
        Self::WorkInProgress,
        Self::CompletionPending,
        Self::Completed,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "APPLIED",
            Self::Shortlisted => "SHORTLISTED",
            Self::InterviewScheduled => "INTERVIEW_SCHEDULED",
            Self::Reviewing => "REVIEWING",
            Self::Selected => "SELECTED",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
            Self::Rejected => "REJECTED",
            Self::NotInterested => "NOT_INTERESTED",
            Self::WorkInProgress => "WORK_IN_PROGRESS",
            Self::CompletionPending => "COMPLETION_PENDING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Map any status string found in the remote store to a canonical status.
    ///
    /// Matching ignores case, surrounding whitespace, and `-`/space vs `_`.
    /// Older rows used a handful of aliases; anything else falls back to
    /// [`UNRECOGNIZED_STATUS_DEFAULT`].
    pub fn from_legacy(raw: &str) -> Self {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let status = match key.as_str() {
            "applied" | "pending" => Some(Self::Applied),
            "shortlisted" => Some(Self::Shortlisted),
            "interview_scheduled" | "interview" => Some(Self::InterviewScheduled),
            "reviewing" | "under_review" | "in_review" => Some(Self::Reviewing),
            "selected" | "hired" => Some(Self::Selected),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "rejected" => Some(Self::Rejected),
            "not_interested" | "notinterested" => Some(Self::NotInterested),
            "work_in_progress" | "in_progress" => Some(Self::WorkInProgress),
            "completion_pending" => Some(Self::CompletionPending),
            "completed" | "work_completed" => Some(Self::Completed),
            _ => None,
        };
        match status {
            Some(status) => {
                debug!(%raw, %status, "from_legacy: mapped");
                status
            }
            None => {
                warn!(%raw, fallback = %UNRECOGNIZED_STATUS_DEFAULT, "Unrecognized application status");
                UNRECOGNIZED_STATUS_DEFAULT
            }
        }
    }

    /// Terminal states; reconsideration creates a new record instead of reviving these
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Rejected | Self::Completed)
    }

    /// States from which an employee may apply again (with a new record)
    pub fn is_reapplicable(&self) -> bool {
        matches!(self, Self::NotInterested | Self::Rejected | Self::Declined)
    }

    /// States in which the employer has not decided yet
    pub fn is_awaiting_employer(&self) -> bool {
        matches!(
            self,
            Self::Applied | Self::Shortlisted | Self::InterviewScheduled | Self::Reviewing
        )
    }

    /// SELECTED and its legacy synonym ACCEPTED
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected | Self::Accepted)
    }

    /// Swipe-feed bucket this status puts its job in
    pub fn outcome(&self) -> JobOutcome {
        if self.is_reapplicable() {
            JobOutcome::Rejected
        } else {
            JobOutcome::Applied
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl From<String> for ApplicationStatus {
    fn from(raw: String) -> Self {
        Self::from_legacy(&raw)
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> Self {
        status.as_str().to_string()
    }
}

/// How the current user has interacted with a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// No final decision recorded
    #[default]
    None,
    Applied,
    Rejected,
    /// Rejected and already offered once for reconsideration
    Reconsidered,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Applied => write!(f, "applied"),
            Self::Rejected => write!(f, "rejected"),
            Self::Reconsidered => write!(f, "reconsidered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_round_trip() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().unwrap(), status);
            assert_eq!(ApplicationStatus::from_legacy(status.as_str()), status);
        }
    }

    #[test]
    fn test_strict_parse_rejects_aliases() {
        assert!("hired".parse::<ApplicationStatus>().is_err());
        assert!("applied".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn test_legacy_spellings() {
        assert_eq!(ApplicationStatus::from_legacy("  applied "), ApplicationStatus::Applied);
        assert_eq!(ApplicationStatus::from_legacy("Not Interested"), ApplicationStatus::NotInterested);
        assert_eq!(ApplicationStatus::from_legacy("interview-scheduled"), ApplicationStatus::InterviewScheduled);
        assert_eq!(ApplicationStatus::from_legacy("in_progress"), ApplicationStatus::WorkInProgress);
        assert_eq!(ApplicationStatus::from_legacy("hired"), ApplicationStatus::Selected);
    }

    #[test]
    fn test_unrecognized_falls_back() {
        assert_eq!(ApplicationStatus::from_legacy("archived"), UNRECOGNIZED_STATUS_DEFAULT);
        assert_eq!(ApplicationStatus::from_legacy(""), UNRECOGNIZED_STATUS_DEFAULT);
    }

    #[test]
    fn test_outcome_families() {
        use ApplicationStatus::*;
        for status in [Applied, Shortlisted, InterviewScheduled, Reviewing, Selected, Accepted] {
            assert_eq!(status.outcome(), JobOutcome::Applied, "{status}");
        }
        for status in [WorkInProgress, CompletionPending, Completed] {
            assert_eq!(status.outcome(), JobOutcome::Applied, "{status}");
        }
        for status in [Rejected, NotInterested, Declined] {
            assert_eq!(status.outcome(), JobOutcome::Rejected, "{status}");
        }
    }

    #[test]
    fn test_serde_uses_legacy_mapping() {
        let status: ApplicationStatus = serde_json::from_str("\"shortlisted\"").unwrap();
        assert_eq!(status, ApplicationStatus::Shortlisted);

        let unknown: ApplicationStatus = serde_json::from_str("\"mystery\"").unwrap();
        assert_eq!(unknown, UNRECOGNIZED_STATUS_DEFAULT);

        let json = serde_json::to_string(&ApplicationStatus::WorkInProgress).unwrap();
        assert_eq!(json, "\"WORK_IN_PROGRESS\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(ApplicationStatus::Completed.is_terminal());
        assert!(ApplicationStatus::Declined.is_terminal());
        assert!(!ApplicationStatus::NotInterested.is_terminal());
        assert!(!ApplicationStatus::Selected.is_terminal());
    }
}
