//! Actor-scoped transition rules for application status

use tracing::{debug, warn};

use crate::domain::{Actor, ApplicationStatus};
use crate::error::{CoreError, CoreResult};

/// Employers only ever select or reject; anything else becomes REJECTED
pub fn normalize_employer_request(requested: ApplicationStatus) -> ApplicationStatus {
    match requested {
        ApplicationStatus::Selected | ApplicationStatus::Rejected => requested,
        other => {
            warn!(requested = %other, normalized = %ApplicationStatus::Rejected, "Employer status request normalized");
            ApplicationStatus::Rejected
        }
    }
}

/// Whether an employee may create a new application given the latest one for the job
pub fn check_new_application(latest: Option<ApplicationStatus>) -> CoreResult<()> {
    match latest {
        None => Ok(()),
        Some(status) if status.is_reapplicable() => Ok(()),
        Some(status) => Err(CoreError::Conflict(format!(
            "an application for this job is already {}",
            status
        ))),
    }
}

/// Validate a change of an existing record's status by `actor`
pub fn check_transition(actor: Actor, from: ApplicationStatus, to: ApplicationStatus) -> CoreResult<()> {
    debug!(%actor, %from, %to, "check_transition: called");
    use ApplicationStatus::*;

    let allowed = match (actor, to) {
        (Actor::Employer, Selected) => from.is_awaiting_employer(),
        (Actor::Employer, Rejected) => from.is_awaiting_employer() || from.is_selected(),
        (Actor::Employee, Declined) => from.is_selected(),
        (Actor::Employee, NotInterested) => from.is_reapplicable(),
        (_, WorkInProgress | CompletionPending | Completed) => return check_work_transition(from, to),
        (actor, to) => {
            return Err(CoreError::Authorization(format!(
                "{} cannot move an application to {}",
                actor, to
            )));
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "cannot move an application from {} to {}",
            from, to
        )))
    }
}

/// OTP-gated transitions; either party may drive them
pub fn check_work_transition(from: ApplicationStatus, to: ApplicationStatus) -> CoreResult<()> {
    use ApplicationStatus::*;

    let allowed = match to {
        WorkInProgress => from.is_selected(),
        CompletionPending => from == WorkInProgress,
        Completed => from == CompletionPending,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "cannot move an application from {} to {}",
            from, to
        )))
    }
}
