//! Gigwork - client core for a gig-work marketplace
//!
//! Tracks which jobs a worker has acted on, drives job applications through
//! their lifecycle, and gates the start and end of physical work behind
//! one-time codes exchanged between employer and worker.
//!
//! # Core Concepts
//!
//! - **Single writer**: the interaction cache is an actor; readers get
//!   immutable snapshots and never block on it
//! - **Bounded waits**: every cache and remote call runs under a timeout, and
//!   a call that timed out never takes effect later
//! - **Remote is truth**: the local book and cache are rebuilt from the
//!   remote store on every sync
//! - **One reconsideration**: a rejected job may be re-offered once, ever
//!
//! # Modules
//!
//! - [`cache`] - Interaction cache actor and snapshots
//! - [`machine`] - Application state machine and transition rules
//! - [`session`] - OTP-gated work sessions
//! - [`sync`] - Reconciliation with the remote store
//! - [`store`] - Remote and reconsideration store traits and backends
//! - [`client`] - Wiring for a signed-in session
//! - [`config`] - Configuration types and loading

pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod machine;
pub mod policy;
pub mod session;
pub mod store;
pub mod sync;
pub mod writeback;

// Re-export commonly used types
pub use cache::{CacheError, InteractionCache, InteractionSnapshot, MarkAs};
pub use client::{GigClient, GigClientBuilder};
pub use config::Config;
pub use domain::{
    Actor, ApplicationRecord, ApplicationStatus, Clock, Identity, JobOutcome, ManualClock, Otp, OtpGenerator,
    SessionStatus, SystemClock, UserContext, WorkSession,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use machine::ApplicationStateMachine;
pub use policy::{Policies, RetryPolicy};
pub use session::{OtpSettings, WorkSessionManager};
pub use store::{
    ApplicationStore, FileReconsiderationStore, InMemoryApplicationStore, MemoryReconsiderationStore,
    ReconsiderationStore, StoreError,
};
pub use sync::{SyncCoordinator, SyncReport, SyncTask};
