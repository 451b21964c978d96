//! Engine lifecycle: an explicit instance value owning its timer, pools, and
//! counters, with lifecycle strictly bound to `start`/`stop`. Nothing here is
//! process-wide.

use crate::checker::{ApplicationChecker, LeaseFactory};
use crate::driver::{BrowserLeaseFactory, SiteDriver};
use crate::error::{EngineError, Result};
use crate::notify::Notifier;
use crate::scheduler::{Scheduler, SharedState};
use chrono::{DateTime, Utc};
use slotwatch_browser::{BrowserHandle, LeasePool};
use slotwatch_core::config::{EngineConfig, RunProfile, StopBehavior};
use slotwatch_core::site::SiteRegistry;
use slotwatch_core::stats::{EngineStats, SiteStats};
use slotwatch_core::store::ApplicationStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

enum EngineState<B> {
    Stopped {
        last: Option<Arc<SharedState<B>>>,
    },
    Running {
        shared: Arc<SharedState<B>>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
}

/// The monitoring engine.
///
/// Generic over the browser-handle type; production code uses
/// [`BrowserMonitorEngine`], tests substitute a unit handle with scripted
/// checkers.
pub struct MonitorEngine<B: Clone + Send + Sync + 'static> {
    config: EngineConfig,
    registry: SiteRegistry,
    store: Arc<dyn ApplicationStore>,
    checker: Arc<dyn ApplicationChecker<B>>,
    factory: Arc<dyn LeaseFactory<B>>,
    state: tokio::sync::Mutex<EngineState<B>>,
}

/// Engine wired to real chromiumoxide browsers.
pub type BrowserMonitorEngine = MonitorEngine<Arc<BrowserHandle>>;

impl BrowserMonitorEngine {
    pub fn with_browser_stack(
        config: EngineConfig,
        registry: SiteRegistry,
        store: Arc<dyn ApplicationStore>,
    ) -> slotwatch_core::Result<Self> {
        let driver = Arc::new(SiteDriver::from_config(&config)?);
        let factory = Arc::new(BrowserLeaseFactory::new(config.profile));
        Ok(Self::new(config, registry, store, driver, factory))
    }
}

impl<B: Clone + Send + Sync + 'static> MonitorEngine<B> {
    pub fn new(
        config: EngineConfig,
        registry: SiteRegistry,
        store: Arc<dyn ApplicationStore>,
        checker: Arc<dyn ApplicationChecker<B>>,
        factory: Arc<dyn LeaseFactory<B>>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            checker,
            factory,
            state: tokio::sync::Mutex::new(EngineState::Stopped { last: None }),
        }
    }

    /// Start monitoring.
    ///
    /// Fails, with no leases created and no timer started, when the engine is
    /// already running, when there are no active applications, or when an
    /// application references an unregistered site. Individual lease launch
    /// failures only reduce pool capacity; start fails only when not a single
    /// lease could be created.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, EngineState::Running { .. }) {
            return Err(EngineError::AlreadyRunning);
        }

        let applications = self.store.active_applications(None).await?;
        if applications.is_empty() {
            return Err(EngineError::NoActiveApplications);
        }

        let mut site_keys: Vec<String> = Vec::new();
        for application in &applications {
            if !site_keys.contains(&application.site_key) {
                site_keys.push(application.site_key.clone());
            }
        }
        // Validate every referenced site before creating any lease.
        for key in &site_keys {
            self.registry.get(key)?;
        }

        let mut pools = HashMap::new();
        let mut total_leases = 0usize;
        for key in &site_keys {
            let site = self.registry.get(key)?;
            let mut handles = Vec::with_capacity(self.config.pool_size);
            for lease in 0..self.config.pool_size {
                match self.factory.create(site).await {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        // Capacity shrinks for this run; not retried.
                        tracing::warn!(site = %key, lease, "lease creation failed: {}", e);
                    }
                }
            }
            total_leases += handles.len();
            tracing::info!(site = %key, leases = handles.len(), "site pool initialized");
            pools.insert(key.clone(), tokio::sync::Mutex::new(LeasePool::new(handles)));
        }

        if total_leases == 0 {
            return Err(EngineError::NoLeases);
        }

        let shared = Arc::new(SharedState {
            pools,
            stats: std::sync::Mutex::new(
                site_keys
                    .iter()
                    .map(|k| (k.clone(), SiteStats::default()))
                    .collect(),
            ),
            last_activity: std::sync::Mutex::new(None),
            started_at: Utc::now(),
        });

        let notifier = Notifier::new(
            self.store.clone(),
            self.config.profile == RunProfile::Interactive,
        );
        let scheduler = Arc::new(Scheduler {
            config: self.config.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            checker: self.checker.clone(),
            notifier,
            shared: shared.clone(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(scheduler.run_loop(shutdown_rx));

        tracing::info!(
            sites = site_keys.len(),
            leases = total_leases,
            applications = applications.len(),
            "monitoring engine started"
        );

        *state = EngineState::Running {
            shared,
            shutdown: shutdown_tx,
            task,
        };
        Ok(())
    }

    /// Stop monitoring: cancel future ticks and close every lease.
    ///
    /// Idempotent; stopping a stopped engine does nothing. The configured
    /// [`StopBehavior`] decides whether an in-flight tick finishes (bounded
    /// by the driver's per-step timeouts) or is aborted.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let current = std::mem::replace(&mut *state, EngineState::Stopped { last: None });

        match current {
            EngineState::Stopped { last } => {
                *state = EngineState::Stopped { last };
            }
            EngineState::Running {
                shared,
                shutdown,
                task,
            } => {
                let _ = shutdown.send(true);
                match self.config.stop_behavior {
                    StopBehavior::WaitForInFlight => {
                        let _ = task.await;
                    }
                    StopBehavior::Interrupt => {
                        task.abort();
                        let _ = task.await;
                    }
                }

                for (site, pool) in &shared.pools {
                    let handles = pool.lock().await.take_handles();
                    tracing::debug!(site = %site, leases = handles.len(), "closing site leases");
                    for handle in handles {
                        self.factory.close(handle).await;
                    }
                }

                tracing::info!("monitoring engine stopped");
                *state = EngineState::Stopped { last: Some(shared) };
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, EngineState::Running { .. })
    }

    /// Per-site and aggregate counters for the current (or most recent) run.
    pub async fn stats(&self) -> EngineStats {
        match self.current_shared().await {
            Some(shared) => {
                let per_site = shared.stats.lock().expect("stats poisoned").clone();
                EngineStats::from_sites(per_site)
            }
            None => EngineStats::default(),
        }
    }

    /// Site keys that currently hold a non-empty lease pool.
    pub async fn active_sites(&self) -> Vec<String> {
        let Some(shared) = self.current_shared().await else {
            return Vec::new();
        };

        let mut sites = Vec::new();
        for (key, pool) in &shared.pools {
            if !pool.lock().await.is_empty() {
                sites.push(key.clone());
            }
        }
        sites.sort();
        sites
    }

    pub async fn last_activity(&self) -> Option<DateTime<Utc>> {
        let shared = self.current_shared().await?;
        *shared.last_activity.lock().expect("activity poisoned")
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        Some(self.current_shared().await?.started_at)
    }

    async fn current_shared(&self) -> Option<Arc<SharedState<B>>> {
        match &*self.state.lock().await {
            EngineState::Running { shared, .. } => Some(shared.clone()),
            EngineState::Stopped { last } => last.clone(),
        }
    }
}
