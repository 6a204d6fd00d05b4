//! GigClient - wires the components for one signed-in session
//!
//! Owns the shared user context, the cache actor, the background write
//! queue and the optional periodic sync. Everything else is a cheap handle
//! cloned out of here.

use eyre::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::InteractionCache;
use crate::config::Config;
use crate::domain::{Clock, Identity, OtpGenerator, RandomOtpGenerator, SystemClock, UserContext};
use crate::error::CoreResult;
use crate::machine::ApplicationStateMachine;
use crate::session::WorkSessionManager;
use crate::store::{ApplicationStore, FileReconsiderationStore, ReconsiderationStore};
use crate::sync::{SyncCoordinator, SyncReport, SyncTask};
use crate::writeback::WriteBack;

/// Builder for [`GigClient`]
pub struct GigClientBuilder {
    config: Config,
    generator: Option<Arc<dyn OtpGenerator>>,
    clock: Option<Arc<dyn Clock>>,
    reconsideration: Option<Arc<dyn ReconsiderationStore>>,
}

impl GigClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            generator: None,
            clock: None,
            reconsideration: None,
        }
    }

    pub fn otp_generator(mut self, generator: Arc<dyn OtpGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this store instead of the file named in the config
    pub fn reconsideration_store(mut self, store: Arc<dyn ReconsiderationStore>) -> Self {
        self.reconsideration = Some(store);
        self
    }

    /// Spawn the cache actor and wire every component; needs a Tokio runtime
    pub fn build(self, store: Arc<dyn ApplicationStore>) -> Result<GigClient> {
        debug!("GigClientBuilder::build: called");
        let reconsideration = match self.reconsideration {
            Some(reconsideration) => reconsideration,
            None => {
                let path = &self.config.reconsideration.store_path;
                let file = FileReconsiderationStore::open(path)
                    .context(format!("Failed to open reconsideration store at {}", path.display()))?;
                Arc::new(file)
            }
        };
        let generator = self.generator.unwrap_or_else(|| Arc::new(RandomOtpGenerator));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let policies = self.config.policies();

        let user = UserContext::new();
        let writeback = WriteBack::new();
        let cache = InteractionCache::spawn(
            reconsideration.clone(),
            writeback.clone(),
            policies,
            self.config.cache.channel_buffer,
        );
        let machine = ApplicationStateMachine::new(
            store.clone(),
            cache.clone(),
            user.clone(),
            writeback.clone(),
            policies,
            clock.clone(),
        );
        let sessions = WorkSessionManager::new(
            store.clone(),
            machine.clone(),
            cache.clone(),
            user.clone(),
            generator,
            clock.clone(),
            policies,
            self.config.otp_settings(),
        );
        let sync = SyncCoordinator::new(
            store,
            reconsideration,
            cache.clone(),
            machine.clone(),
            user.clone(),
            clock,
            policies,
        );

        info!("GigClient ready");
        Ok(GigClient {
            config: self.config,
            user,
            writeback,
            cache,
            machine,
            sessions,
            sync,
            periodic: Arc::new(Mutex::new(None)),
        })
    }
}

/// The assembled client core
#[derive(Clone)]
pub struct GigClient {
    config: Config,
    user: UserContext,
    writeback: WriteBack,
    cache: InteractionCache,
    machine: ApplicationStateMachine,
    sessions: WorkSessionManager,
    sync: SyncCoordinator,
    periodic: Arc<Mutex<Option<SyncTask>>>,
}

impl GigClient {
    pub fn builder(config: Config) -> GigClientBuilder {
        GigClientBuilder::new(config)
    }

    /// Build with defaults for everything but the config and remote store
    pub fn open(config: Config, store: Arc<dyn ApplicationStore>) -> Result<Self> {
        Self::builder(config).build(store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn cache(&self) -> &InteractionCache {
        &self.cache
    }

    pub fn machine(&self) -> &ApplicationStateMachine {
        &self.machine
    }

    pub fn sessions(&self) -> &WorkSessionManager {
        &self.sessions
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Background writes that gave up since startup
    pub fn write_failures(&self) -> u64 {
        self.writeback.failure_count()
    }

    /// Record the user and run the initial load
    ///
    /// The user stays signed in when the load fails; a later refresh
    /// fills the cache.
    pub async fn sign_in(&self, identity: Identity) -> CoreResult<SyncReport> {
        debug!(user_id = %identity.user_id, "sign_in: called");
        if self.user.current().is_some() {
            self.sign_out().await?;
        }
        self.user.sign_in(identity);
        self.sync.load().await
    }

    /// Drain pending writes and forget all local state for the user
    pub async fn sign_out(&self) -> CoreResult<()> {
        debug!("sign_out: called");
        self.stop_periodic_sync().await;
        self.writeback.flush().await;
        self.user.sign_out();
        self.machine.clear();
        self.cache.reset_all().await?;
        Ok(())
    }

    /// Start periodic resync at the configured interval; no-op if disabled or running
    pub async fn start_periodic_sync(&self) -> bool {
        let Some(every) = self.config.sync_interval() else {
            debug!("start_periodic_sync: disabled by config");
            return false;
        };
        let mut periodic = self.periodic.lock().await;
        if periodic.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        *periodic = Some(self.sync.spawn_periodic(every));
        true
    }

    pub async fn stop_periodic_sync(&self) {
        if let Some(task) = self.periodic.lock().await.take() {
            task.stop().await;
        }
    }

    /// Wait for queued background writes
    pub async fn flush(&self) {
        self.writeback.flush().await;
    }

    /// Stop background work and the cache actor
    pub async fn shutdown(&self) {
        info!("GigClient shutting down");
        self.stop_periodic_sync().await;
        self.writeback.flush().await;
        if let Err(e) = self.cache.shutdown().await {
            warn!(error = %e, "Cache actor already stopped");
        }
    }
}
