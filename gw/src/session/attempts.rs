//! Failed-verification counter per live OTP

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Result of recording a wrong code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// Attempts remaining before lockout, if limited
    pub attempts_left: Option<u32>,
    /// This failure used up the last attempt
    pub locked_out: bool,
}

/// Counts wrong guesses per application; a newly issued OTP starts from zero
#[derive(Debug, Default)]
pub struct OtpAttempts {
    max_attempts: Option<u32>,
    failures: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
}

impl OtpAttempts {
    /// `None` disables the lockout
    pub fn new(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failures_for(&self, application_id: &str, issued_at: DateTime<Utc>) -> u32 {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get(application_id) {
            Some((issued, count)) if *issued == issued_at => *count,
            _ => 0,
        }
    }

    /// Whether the OTP issued at `issued_at` may still be tried
    pub fn is_locked_out(&self, application_id: &str, issued_at: DateTime<Utc>) -> bool {
        match self.max_attempts {
            Some(max) => self.failures_for(application_id, issued_at) >= max,
            None => false,
        }
    }

    pub fn record_failure(&self, application_id: &str, issued_at: DateTime<Utc>) -> Failure {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = failures
            .entry(application_id.to_string())
            .or_insert((issued_at, 0));
        if entry.0 != issued_at {
            *entry = (issued_at, 0);
        }
        entry.1 += 1;
        let attempts_left = self.max_attempts.map(|max| max.saturating_sub(entry.1));
        Failure {
            attempts_left,
            locked_out: attempts_left == Some(0),
        }
    }

    pub fn clear(&self, application_id: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(application_id);
    }
}
