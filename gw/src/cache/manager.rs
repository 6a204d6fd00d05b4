//! InteractionCache - actor that owns the job classification
//!
//! Mutations are commands to a single writer task. Each committed mutation
//! publishes a new [`InteractionSnapshot`] through a watch channel, so reads
//! never wait on the writer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::domain::JobOutcome;
use crate::policy::Policies;
use crate::store::ReconsiderationStore;
use crate::writeback::WriteBack;

use super::messages::{CacheCommand, CacheError, Committed};
use super::snapshot::{InteractionSnapshot, MarkAs};

/// Handle to the interaction cache actor
#[derive(Clone)]
pub struct InteractionCache {
    tx: mpsc::Sender<CacheCommand>,
    state: watch::Receiver<Arc<InteractionSnapshot>>,
    store: Arc<dyn ReconsiderationStore>,
    writeback: WriteBack,
    policies: Policies,
}

impl InteractionCache {
    /// Spawn the actor on the current runtime
    pub fn spawn(
        store: Arc<dyn ReconsiderationStore>,
        writeback: WriteBack,
        policies: Policies,
        channel_buffer: usize,
    ) -> Self {
        debug!(channel_buffer, "InteractionCache::spawn: called");
        let (tx, rx) = mpsc::channel(channel_buffer.max(1));
        let (state_tx, state) = watch::channel(Arc::new(InteractionSnapshot::default()));

        tokio::spawn(actor_loop(rx, state_tx));

        info!("InteractionCache spawned");
        Self {
            tx,
            state,
            store,
            writeback,
            policies,
        }
    }

    // === Reads (served from the last published snapshot) ===

    pub fn snapshot(&self) -> Arc<InteractionSnapshot> {
        self.state.borrow().clone()
    }

    /// Stream of snapshots, for views that redraw on change
    pub fn subscribe(&self) -> watch::Receiver<Arc<InteractionSnapshot>> {
        self.state.clone()
    }

    pub fn is_applied(&self, job_id: &str) -> bool {
        self.state.borrow().is_applied(job_id)
    }

    pub fn is_rejected(&self, job_id: &str) -> bool {
        self.state.borrow().is_rejected(job_id)
    }

    pub fn is_processed(&self, job_id: &str) -> bool {
        self.state.borrow().is_processed(job_id)
    }

    pub fn is_reconsidered(&self, job_id: &str) -> bool {
        self.state.borrow().is_reconsidered(job_id)
    }

    pub fn is_visible(&self, job_id: &str) -> bool {
        self.state.borrow().is_visible(job_id)
    }

    pub fn is_reconsideration_mode(&self) -> bool {
        self.state.borrow().is_reconsideration_mode()
    }

    pub fn outcome(&self, job_id: &str) -> JobOutcome {
        self.state.borrow().outcome(job_id)
    }

    pub fn eligible_for_reconsideration(&self) -> Vec<String> {
        self.state.borrow().eligible_for_reconsideration()
    }

    pub fn filter_feed<I, S>(&self, job_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.snapshot().filter_feed(job_ids)
    }

    // === Mutations ===

    pub async fn mark_applied(&self, job_id: &str) -> Result<(), CacheError> {
        debug!(%job_id, "mark_applied: called");
        self.mark(job_id, MarkAs::Applied, false).await
    }

    pub async fn mark_rejected(&self, job_id: &str) -> Result<(), CacheError> {
        debug!(%job_id, "mark_rejected: called");
        self.mark(job_id, MarkAs::Rejected, false).await
    }

    /// Enqueue a rejection without waiting for it to be applied.
    ///
    /// Returns `Busy` if the command queue is full. Readers see the change
    /// once the actor republishes.
    pub fn mark_rejected_fast(&self, job_id: &str) -> Result<(), CacheError> {
        debug!(%job_id, "mark_rejected_fast: called");
        self.tx
            .try_send(CacheCommand::MarkRejectedFast {
                job_id: job_id.to_string(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => CacheError::Busy,
                TrySendError::Closed(_) => CacheError::ChannelClosed,
            })
    }

    /// Record the final decision on a re-offered job and use up its reconsideration
    pub async fn resolve_reconsideration(&self, job_id: &str, mark: MarkAs) -> Result<(), CacheError> {
        debug!(%job_id, ?mark, "resolve_reconsideration: called");
        self.mark(job_id, mark, true).await?;
        self.persist_reconsidered(vec![job_id.to_string()]).await;
        Ok(())
    }

    pub async fn mark_reconsidered(&self, job_id: &str) -> Result<(), CacheError> {
        debug!(%job_id, "mark_reconsidered: called");
        self.mark_reconsidered_batch(&[job_id.to_string()]).await
    }

    /// Permanently exclude jobs from reconsideration; persisted in the background
    pub async fn mark_reconsidered_batch(&self, job_ids: &[String]) -> Result<(), CacheError> {
        let job_ids: Vec<String> = job_ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();
        debug!(count = job_ids.len(), "mark_reconsidered_batch: called");
        if job_ids.is_empty() {
            return Ok(());
        }
        let added = self
            .request("mark_reconsidered", self.policies.cache_update.timeout, |reply| {
                CacheCommand::MarkReconsidered {
                    job_ids: job_ids.clone(),
                    reply,
                }
            })
            .await?;
        debug!(added, "mark_reconsidered_batch: committed");
        self.persist_reconsidered(job_ids).await;
        Ok(())
    }

    /// Add ids read back from the reconsideration store; nothing is written back
    pub async fn restore_reconsidered(&self, job_ids: &HashSet<String>) -> Result<usize, CacheError> {
        let missing: Vec<String> = job_ids
            .difference(self.snapshot().reconsidered_ids())
            .filter(|id| !id.trim().is_empty())
            .cloned()
            .collect();
        debug!(count = missing.len(), "restore_reconsidered: called");
        if missing.is_empty() {
            return Ok(0);
        }
        self.request("restore_reconsidered", self.policies.cache_update.timeout, |reply| {
            CacheCommand::MarkReconsidered { job_ids: missing, reply }
        })
        .await
    }

    pub async fn set_reconsideration_mode(&self, enabled: bool) -> Result<(), CacheError> {
        debug!(enabled, "set_reconsideration_mode: called");
        self.request("set_reconsideration_mode", self.policies.cache_update.timeout, |reply| {
            CacheCommand::SetReconsiderationMode { enabled, reply }
        })
        .await
    }

    /// Replace the applied and rejected sets in one step; reconsidered ids are added
    pub async fn bulk_load(
        &self,
        applied: HashSet<String>,
        rejected: HashSet<String>,
        reconsidered: HashSet<String>,
    ) -> Result<(), CacheError> {
        debug!(
            applied = applied.len(),
            rejected = rejected.len(),
            reconsidered = reconsidered.len(),
            "bulk_load: called"
        );
        self.request("bulk_load", self.policies.cache_bulk.timeout, |reply| CacheCommand::BulkLoad {
            applied,
            rejected,
            reconsidered,
            reply,
        })
        .await
    }

    /// Forget everything, including reconsidered ids (sign-out)
    pub async fn reset_all(&self) -> Result<(), CacheError> {
        debug!("reset_all: called");
        self.request("reset_all", self.policies.cache_bulk.timeout, |reply| CacheCommand::ResetAll { reply })
            .await
    }

    /// Stop the actor after it drains queued commands; snapshots stay readable
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        debug!("InteractionCache::shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CacheCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| CacheError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CacheError::ChannelClosed)
    }

    async fn mark(&self, job_id: &str, mark: MarkAs, consume_reconsideration: bool) -> Result<(), CacheError> {
        self.request("mark", self.policies.cache_update.timeout, |reply| CacheCommand::Mark {
            job_id: job_id.to_string(),
            mark,
            consume_reconsideration,
            reply,
        })
        .await
    }

    /// Send a command and wait, within `timeout`, for the actor to commit it.
    ///
    /// The actor commits only after handing the reply over, so once the
    /// receiver is closed here a late command is discarded by the actor.
    async fn request<T>(
        &self,
        operation: &'static str,
        timeout: Duration,
        make: impl FnOnce(oneshot::Sender<Committed<T>>) -> CacheCommand,
    ) -> Result<T, CacheError> {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let command = make(reply_tx);
        let exchange = async {
            self.tx.send(command).await.map_err(|_| CacheError::ChannelClosed)?;
            (&mut reply_rx).await.map_err(|_| CacheError::ChannelClosed)
        };
        let outcome = tokio::time::timeout(timeout, exchange).await;

        let committed = match outcome {
            Ok(result) => result?,
            Err(_) => {
                reply_rx.close();
                match reply_rx.try_recv() {
                    Ok(committed) => committed,
                    Err(_) => {
                        warn!(operation, ?timeout, "Cache operation timed out, state unchanged");
                        return Err(CacheError::Timeout {
                            operation,
                            after_ms: timeout.as_millis() as u64,
                        });
                    }
                }
            }
        };

        // Read-your-writes: the snapshot carrying this commit is published right after the reply
        let mut state = self.state.clone();
        state
            .wait_for(|snapshot| snapshot.version() >= committed.version)
            .await
            .map_err(|_| CacheError::ChannelClosed)?;
        Ok(committed.value)
    }

    async fn persist_reconsidered(&self, job_ids: Vec<String>) {
        let store = self.store.clone();
        let policy = self.policies.remote_write;
        self.writeback
            .spawn("persist reconsidered", async move {
                policy
                    .run("reconsideration append", || {
                        let store = store.clone();
                        let job_ids = job_ids.clone();
                        async move { store.append_batch(&job_ids).await }
                    })
                    .await?;
                Ok(())
            })
            .await;
    }
}

/// Actor loop owning the authoritative snapshot
async fn actor_loop(mut rx: mpsc::Receiver<CacheCommand>, state_tx: watch::Sender<Arc<InteractionSnapshot>>) {
    debug!("InteractionCache actor started");
    let mut current = state_tx.borrow().clone();

    while let Some(cmd) = rx.recv().await {
        let mut next = current.as_ref().clone().with_version(current.version() + 1);
        match cmd {
            CacheCommand::Mark {
                job_id,
                mark,
                consume_reconsideration,
                reply,
            } => {
                debug!(%job_id, ?mark, consume_reconsideration, "actor_loop: Mark command");
                next.mark(&job_id, mark);
                if consume_reconsideration {
                    next.mark_reconsidered([&job_id]);
                }
                commit(&state_tx, &mut current, next, reply, ());
            }

            CacheCommand::MarkRejectedFast { job_id } => {
                debug!(%job_id, "actor_loop: MarkRejectedFast command");
                next.mark(&job_id, MarkAs::Rejected);
                publish(&state_tx, &mut current, next);
            }

            CacheCommand::MarkReconsidered { job_ids, reply } => {
                debug!(count = job_ids.len(), "actor_loop: MarkReconsidered command");
                let added = next.mark_reconsidered(&job_ids);
                commit(&state_tx, &mut current, next, reply, added);
            }

            CacheCommand::SetReconsiderationMode { enabled, reply } => {
                debug!(enabled, "actor_loop: SetReconsiderationMode command");
                next.set_reconsideration_mode(enabled);
                commit(&state_tx, &mut current, next, reply, ());
            }

            CacheCommand::BulkLoad {
                applied,
                rejected,
                reconsidered,
                reply,
            } => {
                debug!("actor_loop: BulkLoad command");
                next.bulk_load(applied, rejected, reconsidered);
                commit(&state_tx, &mut current, next, reply, ());
            }

            CacheCommand::ResetAll { reply } => {
                debug!("actor_loop: ResetAll command");
                next.reset();
                commit(&state_tx, &mut current, next, reply, ());
            }

            CacheCommand::Shutdown { reply } => {
                info!("InteractionCache shutting down");
                let _ = reply.send(());
                break;
            }
        }
    }

    debug!("InteractionCache actor stopped");
}

/// Publish `next` only if the caller is still there to receive the reply
fn commit<T>(
    state_tx: &watch::Sender<Arc<InteractionSnapshot>>,
    current: &mut Arc<InteractionSnapshot>,
    next: InteractionSnapshot,
    reply: oneshot::Sender<Committed<T>>,
    value: T,
) {
    let version = next.version();
    if reply.send(Committed { value, version }).is_err() {
        debug!(version, "actor_loop: caller gave up, mutation discarded");
        return;
    }
    publish(state_tx, current, next);
}

fn publish(
    state_tx: &watch::Sender<Arc<InteractionSnapshot>>,
    current: &mut Arc<InteractionSnapshot>,
    next: InteractionSnapshot,
) {
    let next = Arc::new(next);
    *current = next.clone();
    state_tx.send_replace(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetryPolicy;
    use crate::store::MemoryReconsiderationStore;

    fn spawn_cache(store: Arc<MemoryReconsiderationStore>, policies: Policies, buffer: usize) -> (InteractionCache, WriteBack) {
        let writeback = WriteBack::new();
        let cache = InteractionCache::spawn(store, writeback.clone(), policies, buffer);
        (cache, writeback)
    }

    fn default_cache() -> (InteractionCache, Arc<MemoryReconsiderationStore>, WriteBack) {
        let store = Arc::new(MemoryReconsiderationStore::new());
        let (cache, writeback) = spawn_cache(store.clone(), Policies::default(), 64);
        (cache, store, writeback)
    }

    #[tokio::test]
    async fn test_marks_are_read_back_immediately() {
        let (cache, _, _) = default_cache();
        cache.mark_applied("j1").await.unwrap();
        assert!(cache.is_applied("j1"));
        assert!(cache.is_processed("j1"));

        cache.mark_rejected("j1").await.unwrap();
        assert!(cache.is_rejected("j1"));
        assert!(!cache.is_applied("j1"));
    }

    #[tokio::test]
    async fn test_fast_path_is_ordered_before_later_commands() {
        let (cache, _, _) = default_cache();
        cache.mark_rejected_fast("j1").unwrap();
        cache.mark_applied("j2").await.unwrap();
        assert!(cache.is_rejected("j1"));
        assert!(!cache.is_visible("j1"));
    }

    #[tokio::test]
    async fn test_fast_path_reports_busy_when_queue_full() {
        let store = Arc::new(MemoryReconsiderationStore::new());
        let (cache, _) = spawn_cache(store, Policies::default(), 1);
        cache.mark_rejected_fast("j1").unwrap();
        assert_eq!(cache.mark_rejected_fast("j2"), Err(CacheError::Busy));
    }

    #[tokio::test]
    async fn test_timed_out_mark_never_lands() {
        let (tx, rx) = mpsc::channel(8);
        let (state_tx, state) = watch::channel(Arc::new(InteractionSnapshot::default()));
        let mut policies = Policies::default();
        policies.cache_update = RetryPolicy::new(Duration::from_millis(20));
        let impatient = InteractionCache {
            tx,
            state,
            store: Arc::new(MemoryReconsiderationStore::new()),
            writeback: WriteBack::new(),
            policies,
        };

        // Actor not started yet: the command is queued but never answered in time
        let err = impatient.mark_applied("j1").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { operation: "mark", .. }));

        tokio::spawn(actor_loop(rx, state_tx));
        let mut patient = impatient.clone();
        patient.policies = Policies::default();
        patient.mark_applied("j2").await.unwrap();

        assert!(patient.is_applied("j2"));
        assert!(!patient.is_applied("j1"));
        assert!(!patient.is_processed("j1"));
        assert_eq!(patient.snapshot().version(), 1);
    }

    #[tokio::test]
    async fn test_reconsidered_is_persisted_and_never_eligible_again() {
        let (cache, store, writeback) = default_cache();
        cache.mark_rejected("j1").await.unwrap();
        cache.mark_rejected("j2").await.unwrap();
        assert_eq!(cache.eligible_for_reconsideration(), vec!["j1".to_string(), "j2".to_string()]);

        cache.mark_reconsidered("j1").await.unwrap();
        writeback.flush().await;
        assert!(store.ids().contains("j1"));

        for enabled in [true, false, true, false] {
            cache.set_reconsideration_mode(enabled).await.unwrap();
            assert_eq!(cache.eligible_for_reconsideration(), vec!["j2".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_offline_store_does_not_fail_mark_reconsidered() {
        let (cache, store, writeback) = default_cache();
        store.set_offline(true);
        cache.mark_reconsidered("j1").await.unwrap();
        writeback.flush().await;
        assert!(cache.is_reconsidered("j1"));
        assert_eq!(writeback.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_reconsideration_is_atomic() {
        let (cache, _, writeback) = default_cache();
        cache.mark_rejected("j1").await.unwrap();
        cache.set_reconsideration_mode(true).await.unwrap();
        let mut updates = cache.subscribe();
        updates.mark_unchanged();

        cache.resolve_reconsideration("j1", MarkAs::Applied).await.unwrap();
        assert!(updates.has_changed().unwrap());
        let snap = cache.snapshot();
        assert!(snap.is_applied("j1") && snap.is_reconsidered("j1"));
        writeback.flush().await;
    }

    #[tokio::test]
    async fn test_bulk_load_and_reset() {
        let (cache, _, _) = default_cache();
        let applied: HashSet<String> = ["a".to_string()].into();
        let rejected: HashSet<String> = ["r".to_string()].into();
        let reconsidered: HashSet<String> = ["r".to_string()].into();
        cache.bulk_load(applied, rejected, reconsidered).await.unwrap();
        assert!(cache.is_applied("a"));
        assert_eq!(cache.outcome("r"), JobOutcome::Reconsidered);
        assert!(cache.eligible_for_reconsideration().is_empty());

        cache.reset_all().await.unwrap();
        assert!(!cache.is_processed("a"));
        assert!(!cache.is_reconsidered("r"));
    }

    #[tokio::test]
    async fn test_after_shutdown_writes_fail_reads_work() {
        let (cache, _, _) = default_cache();
        cache.mark_applied("j1").await.unwrap();
        cache.shutdown().await.unwrap();
        assert_eq!(cache.mark_applied("j2").await, Err(CacheError::ChannelClosed));
        assert!(cache.is_applied("j1"));
    }
}
