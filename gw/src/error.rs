//! Error taxonomy for state-machine and session operations
//!
//! Every fallible public operation returns [`CoreError`]. Callers branch on
//! [`CoreError::kind`] to choose between retrying and showing a message.

use thiserror::Error;

use crate::cache::CacheError;
use crate::domain::OtpFormatError;
use crate::policy::PolicyError;
use crate::store::StoreError;

/// Result alias used across the crate
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    Validation,
    Timeout,
    Conflict,
    NotFound,
    Unavailable,
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// No authenticated user, or the actor does not own the transition
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Malformed input or a transition the current state does not allow
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Well-formed code that is not the live one; the same code will never succeed
    #[error("OTP does not match")]
    OtpMismatch { attempts_left: Option<u32> },

    /// A bounded operation ran out of time; the same request may be retried
    #[error("{operation} timed out after {after_ms}ms, please retry")]
    Timeout { operation: String, after_ms: u64 },

    /// Duplicate application, or no live OTP to verify against
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::Validation(_) | Self::OtpMismatch { .. } => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Whether repeating the identical request can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Unavailable)
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Rejected(why) => Self::Conflict(why),
            StoreError::Unavailable(why) => Self::Unavailable(why),
        }
    }
}

impl From<CacheError> for CoreError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Timeout { operation, after_ms } => Self::Timeout {
                operation: format!("cache {}", operation),
                after_ms,
            },
            CacheError::ChannelClosed | CacheError::Busy => Self::Unavailable(e.to_string()),
        }
    }
}

impl From<OtpFormatError> for CoreError {
    fn from(e: OtpFormatError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl<E: Into<CoreError>> From<PolicyError<E>> for CoreError {
    fn from(e: PolicyError<E>) -> Self {
        match e {
            PolicyError::TimedOut { operation, after, .. } => Self::Timeout {
                operation,
                after_ms: after.as_millis() as u64,
            },
            PolicyError::Failed(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kinds() {
        assert_eq!(CoreError::OtpMismatch { attempts_left: Some(2) }.kind(), ErrorKind::Validation);
        assert_eq!(CoreError::Conflict("dup".into()).kind(), ErrorKind::Conflict);
        assert!(
            CoreError::Timeout {
                operation: "x".into(),
                after_ms: 5
            }
            .is_retryable()
        );
        assert!(!CoreError::OtpMismatch { attempts_left: None }.is_retryable());
    }

    #[test]
    fn test_policy_timeout_maps_to_timeout() {
        let err: CoreError = PolicyError::<StoreError>::TimedOut {
            operation: "update_status".into(),
            after: Duration::from_millis(250),
            attempts: 1,
        }
        .into();
        assert!(matches!(err, CoreError::Timeout { after_ms: 250, .. }));
        assert!(err.to_string().contains("retry"));
    }

    #[test]
    fn test_store_errors_map() {
        let err: CoreError = PolicyError::Failed(StoreError::Rejected("duplicate".into())).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err: CoreError = StoreError::NotFound("app".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
