//! Background remote write-through
//!
//! UI-facing mutations commit locally and push to the remote store from a
//! spawned task. Tasks are tracked so callers can wait for them (sign-out,
//! shutdown, tests) and so failures are counted instead of lost.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Tracker for in-flight write-through tasks
#[derive(Debug, Clone, Default)]
pub struct WriteBack {
    tasks: Arc<Mutex<JoinSet<()>>>,
    failures: Arc<AtomicU64>,
}

impl WriteBack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` in the background; a failure is logged and counted
    pub async fn spawn<F>(&self, operation: &'static str, fut: F)
    where
        F: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        debug!(operation, "WriteBack::spawn: called");
        let failures = self.failures.clone();
        let mut tasks = self.tasks.lock().await;
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                warn!(error = %e, "Write-through task panicked");
            }
        }
        tasks.spawn(async move {
            if let Err(e) = fut.await {
                failures.fetch_add(1, Ordering::SeqCst);
                warn!(operation, error = %e, "Write-through failed, next sync will reconcile");
            }
        });
    }

    /// Wait for every task spawned so far
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.tasks.lock().await);
        debug!(pending = pending.len(), "WriteBack::flush: called");
        while let Some(done) = pending.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "Write-through task panicked");
            }
        }
    }

    /// Tasks not yet reaped
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Write-throughs that gave up since this tracker was created
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }
}
