//! SyncCoordinator - reconcile local state with the remote store
//!
//! One sync pulls every application row for the signed-in user, keeps the
//! newest row per job, and replaces the cache's applied/rejected sets in a
//! single bulk load. Persisted reconsidered ids are merged in before the
//! fetch; otherwise a failed or timed-out sync leaves the cache as it was.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::InteractionCache;
use crate::domain::{ApplicationRecord, Clock, JobOutcome, UserContext};
use crate::error::CoreResult;
use crate::machine::ApplicationStateMachine;
use crate::policy::Policies;
use crate::store::{ApplicationStore, ReconsiderationStore};

/// Counts from one completed sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Rows returned by the remote store, including superseded ones
    pub records: usize,
    /// Distinct jobs the user has an outcome for
    pub jobs: usize,
    pub applied: usize,
    pub rejected: usize,
    pub reconsidered: usize,
    /// False when the persisted reconsideration set could not be read
    pub reconsideration_loaded: bool,
    pub synced_at: DateTime<Utc>,
}

/// Per-job outcome taken from the newest record of `employee_id` for each job
pub fn derive_outcomes<'a>(
    records: impl IntoIterator<Item = &'a ApplicationRecord>,
    employee_id: &str,
) -> HashMap<String, JobOutcome> {
    let mut latest: HashMap<&str, &ApplicationRecord> = HashMap::new();
    for record in records.into_iter().filter(|r| r.employee_id == employee_id) {
        match latest.get(record.job_id.as_str()) {
            Some(current) if !record.is_newer_than(current) => {}
            _ => {
                latest.insert(record.job_id.as_str(), record);
            }
        }
    }
    latest
        .into_iter()
        .map(|(job_id, record)| (job_id.to_string(), record.status.outcome()))
        .collect()
}

/// Handle to the sync coordinator; clones share state
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn ApplicationStore>,
    reconsideration: Arc<dyn ReconsiderationStore>,
    cache: InteractionCache,
    machine: ApplicationStateMachine,
    user: UserContext,
    clock: Arc<dyn Clock>,
    policies: Policies,
    last_synced_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl SyncCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        reconsideration: Arc<dyn ReconsiderationStore>,
        cache: InteractionCache,
        machine: ApplicationStateMachine,
        user: UserContext,
        clock: Arc<dyn Clock>,
        policies: Policies,
    ) -> Self {
        debug!("SyncCoordinator::new: called");
        Self {
            store,
            reconsideration,
            cache,
            machine,
            user,
            clock,
            policies,
            last_synced_at: Arc::new(RwLock::new(None)),
        }
    }

    /// Initial sync after sign-in
    pub async fn load(&self) -> CoreResult<SyncReport> {
        debug!("load: called");
        self.sync("load").await
    }

    /// On-demand resync
    pub async fn refresh(&self) -> CoreResult<SyncReport> {
        debug!("refresh: called");
        self.sync("refresh").await
    }

    /// When the last successful sync finished
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        *self.last_synced_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resync every `every` until stopped; failures are logged and retried next tick
    pub fn spawn_periodic(&self, every: Duration) -> SyncTask {
        debug!(?every, "spawn_periodic: called");
        let coordinator = self.clone();
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; sign-in already loaded
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if coordinator.user.current().is_none() {
                            debug!("spawn_periodic: nobody signed in, skipping");
                            continue;
                        }
                        if let Err(e) = coordinator.sync("periodic").await {
                            warn!(error = %e, "Periodic sync failed");
                        }
                    }
                    _ = stop_rx.recv() => {
                        debug!("spawn_periodic: stop received");
                        break;
                    }
                }
            }
            info!("Periodic sync stopped");
        });

        info!(?every, "Periodic sync started");
        SyncTask { stop_tx, handle }
    }

    async fn sync(&self, trigger: &'static str) -> CoreResult<SyncReport> {
        let identity = self.user.require()?;
        let user_id = identity.user_id.as_str();
        debug!(trigger, %user_id, "sync: called");

        // Persisted reconsiderations go in first so they hold even when the fetch fails
        let (persisted, reconsideration_loaded) = match self
            .policies
            .remote_read
            .run("reconsideration load", || self.reconsideration.load())
            .await
        {
            Ok(ids) => (ids, true),
            Err(e) => {
                warn!(error = %e, "Reconsideration store unavailable, using cached ids");
                (HashSet::new(), false)
            }
        };
        let restored = self.cache.restore_reconsidered(&persisted).await?;
        if restored > 0 {
            debug!(restored, "sync: restored persisted reconsiderations");
        }

        let remote = match self
            .policies
            .sync
            .run("list_applications_for_user", || self.store.list_applications_for_user(user_id))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(trigger, error = %e, "Sync failed, keeping cached state");
                return Err(e.into());
            }
        };

        let merged = self.machine.merged_with(&remote);
        let outcomes = derive_outcomes(&merged, user_id);
        let mut applied = HashSet::new();
        let mut rejected = HashSet::new();
        for (job_id, outcome) in &outcomes {
            match outcome {
                JobOutcome::Applied => {
                    applied.insert(job_id.clone());
                }
                JobOutcome::Rejected | JobOutcome::Reconsidered => {
                    rejected.insert(job_id.clone());
                }
                JobOutcome::None => {}
            }
        }
        let (applied_count, rejected_count) = (applied.len(), rejected.len());

        if let Err(e) = self.cache.bulk_load(applied, rejected, persisted.clone()).await {
            warn!(trigger, error = %e, "Cache bulk load failed, keeping cached state");
            return Err(e.into());
        }
        self.machine.merge(&remote);

        let snapshot = self.cache.snapshot();
        if reconsideration_loaded {
            let unpersisted: Vec<String> = snapshot.reconsidered_ids().difference(&persisted).cloned().collect();
            if !unpersisted.is_empty() {
                info!(count = unpersisted.len(), "Re-persisting reconsidered ids");
                self.cache.mark_reconsidered_batch(&unpersisted).await?;
            }
        }

        let synced_at = self.clock.now();
        *self.last_synced_at.write().unwrap_or_else(PoisonError::into_inner) = Some(synced_at);
        let report = SyncReport {
            records: remote.len(),
            jobs: outcomes.len(),
            applied: applied_count,
            rejected: rejected_count,
            reconsidered: snapshot.reconsidered_ids().len(),
            reconsideration_loaded,
            synced_at,
        };
        info!(
            trigger,
            records = report.records,
            applied = report.applied,
            rejected = report.rejected,
            "Sync complete"
        );
        Ok(report)
    }
}

/// Running periodic sync
#[derive(Debug)]
pub struct SyncTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl SyncTask {
    /// Stop after any sync in progress finishes
    pub async fn stop(self) {
        debug!("SyncTask::stop: called");
        let _ = self.stop_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Periodic sync task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
