//! Interaction cache messages
//!
//! Commands and replies for the cache actor.

use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::oneshot;

use super::snapshot::MarkAs;

/// Errors from cache operations; state is unchanged whenever one is returned
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache {operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("Cache actor is not running")]
    ChannelClosed,

    /// Fast-path queue full
    #[error("Cache is busy")]
    Busy,
}

/// Reply for a committed mutation, with the snapshot version that carries it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed<T> {
    pub value: T,
    pub version: u64,
}

/// Commands sent to the cache actor
#[derive(Debug)]
pub enum CacheCommand {
    Mark {
        job_id: String,
        mark: MarkAs,
        /// Also record the job as reconsidered, in the same snapshot
        consume_reconsideration: bool,
        reply: oneshot::Sender<Committed<()>>,
    },
    /// Enqueued without a reply
    MarkRejectedFast { job_id: String },
    MarkReconsidered {
        job_ids: Vec<String>,
        reply: oneshot::Sender<Committed<usize>>,
    },
    SetReconsiderationMode {
        enabled: bool,
        reply: oneshot::Sender<Committed<()>>,
    },
    BulkLoad {
        applied: HashSet<String>,
        rejected: HashSet<String>,
        reconsidered: HashSet<String>,
        reply: oneshot::Sender<Committed<()>>,
    },
    ResetAll {
        reply: oneshot::Sender<Committed<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
