//! Interaction cache
//!
//! Classifies job ids as applied, rejected, or reconsidered for the swipe
//! feed. A single actor task owns mutation; everyone else reads immutable
//! snapshots.

mod manager;
mod messages;
mod snapshot;

pub use manager::InteractionCache;
pub use messages::{CacheCommand, CacheError, Committed};
pub use snapshot::{InteractionSnapshot, MarkAs};
