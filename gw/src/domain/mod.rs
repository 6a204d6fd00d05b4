//! Domain types for gigwork
//!
//! Core domain types: ApplicationRecord, WorkSession, Otp and the closed
//! status enums they carry. Status strings read from the remote store are
//! normalized in exactly one place, [`ApplicationStatus::from_legacy`].

mod application;
mod clock;
mod identity;
mod otp;
mod session;
mod status;

pub use application::ApplicationRecord;
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Actor, Identity, UserContext};
pub use otp::{Otp, OtpFormatError, OtpGenerator, RandomOtpGenerator, SequenceOtpGenerator};
pub use session::{SessionStatus, WorkSession, compute_wage_cents, duration_minutes};
pub(crate) use session::is_expired;
pub use status::{ApplicationStatus, JobOutcome, UNRECOGNIZED_STATUS_DEFAULT, UnknownStatus};
