//! Synchronization with the remote store

mod coordinator;

pub use coordinator::{SyncCoordinator, SyncReport, SyncTask, derive_outcomes};
