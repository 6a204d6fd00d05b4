//! KeySet - append-only persisted set of string keys
//!
//! Keeps a set of identifiers on disk so it survives process restarts.
//! Membership is monotonic: keys are only ever appended, and the whole set
//! can only be dropped with an explicit [`KeySet::clear`].
//!
//! # Architecture
//!
//! ```text
//! reconsidered.jsonl
//! {"key":"job-17","added_at":1760000000000}
//! {"key":"job-42","added_at":1760000004512}
//! ```
//!
//! Every write takes an exclusive `fs2` lock on the file, so several
//! processes (the app and the `ks` CLI) can share one set.
//!
//! # Example
//!
//! ```ignore
//! use keyset::KeySet;
//!
//! let set = KeySet::open("reconsidered.jsonl")?;
//! set.append("job-17")?;
//! assert!(set.contains("job-17")?);
//! ```

pub mod cli;
pub mod config;
mod store;

pub use store::{KeyEntry, KeySet, KeySetError};

/// Default file name for a key set inside the data directory
pub const DEFAULT_FILE_NAME: &str = "reconsidered.jsonl";
