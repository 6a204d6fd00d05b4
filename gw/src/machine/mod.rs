//! Application state machine
//!
//! Canonical status of application records with actor-scoped transitions.

mod book;
mod rules;

pub use book::ApplicationStateMachine;
pub use rules::{check_new_application, check_transition, check_work_transition, normalize_employer_request};
