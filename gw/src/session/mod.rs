//! Work sessions
//!
//! OTP issuance and verification between selection and verified completion.

mod attempts;
mod manager;

pub use attempts::{Failure, OtpAttempts};
pub use manager::WorkSessionManager;

use std::time::Duration;

/// Limits applied to every issued OTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpSettings {
    /// Wrong codes allowed per live OTP; `None` is unlimited
    pub max_attempts: Option<u32>,
    /// Lifetime of an issued OTP; `None` never expires
    pub ttl: Option<Duration>,
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            ttl: Some(Duration::from_secs(15 * 60)),
        }
    }
}
