//! The repeating monitoring loop.
//!
//! Each tick fetches the active applications, partitions them by site, and
//! runs one batch per site through that site's lease pool. Failures are
//! contained per application; nothing a single check does can abort the rest
//! of its batch or the loop.

use crate::checker::{ApplicationChecker, CheckError, CheckOutcome};
use crate::notify::{Notifier, NotifyEvent};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use slotwatch_browser::LeasePool;
use slotwatch_core::application::ApplicationRecord;
use slotwatch_core::config::{EngineConfig, SiteConcurrency};
use slotwatch_core::site::{SiteConfig, SiteRegistry};
use slotwatch_core::stats::SiteStats;
use slotwatch_core::store::ApplicationStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// State shared between the engine facade and the running loop.
pub(crate) struct SharedState<B> {
    pub pools: HashMap<String, tokio::sync::Mutex<LeasePool<B>>>,
    pub stats: std::sync::Mutex<HashMap<String, SiteStats>>,
    pub last_activity: std::sync::Mutex<Option<DateTime<Utc>>>,
    pub started_at: DateTime<Utc>,
}

pub(crate) struct Scheduler<B: Clone + Send + Sync + 'static> {
    pub config: EngineConfig,
    pub registry: SiteRegistry,
    pub store: Arc<dyn ApplicationStore>,
    pub checker: Arc<dyn ApplicationChecker<B>>,
    pub notifier: Notifier,
    pub shared: Arc<SharedState<B>>,
}

/// Group applications by site key, preserving both the first-seen site order
/// and the store's ordering within each site.
pub(crate) fn partition_by_site(
    applications: Vec<ApplicationRecord>,
) -> Vec<(String, Vec<ApplicationRecord>)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_site: HashMap<String, Vec<ApplicationRecord>> = HashMap::new();

    for application in applications {
        if !by_site.contains_key(&application.site_key) {
            order.push(application.site_key.clone());
        }
        by_site
            .entry(application.site_key.clone())
            .or_default()
            .push(application);
    }

    order
        .into_iter()
        .map(|key| {
            let batch = by_site.remove(&key).unwrap_or_default();
            (key, batch)
        })
        .collect()
}

impl<B: Clone + Send + Sync + 'static> Scheduler<B> {
    /// Run ticks until the shutdown signal fires. An in-flight tick always
    /// runs to completion within this loop; interruption, when configured,
    /// happens by aborting the task that runs it.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => self.run_tick().await,
            }
        }

        tracing::debug!("scheduler loop exited");
    }

    async fn run_tick(&self) {
        let applications = match self.store.active_applications(None).await {
            Ok(applications) => applications,
            Err(e) => {
                tracing::warn!("could not fetch active applications: {}", e);
                return;
            }
        };

        if applications.is_empty() {
            tracing::debug!("no active applications this tick");
            return;
        }

        let batches = partition_by_site(applications);
        tracing::debug!(sites = batches.len(), "tick started");

        match self.config.site_concurrency {
            SiteConcurrency::Sequential => {
                for (i, (site_key, batch)) in batches.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(self.config.inter_site_delay).await;
                    }
                    self.run_site_batch(site_key, batch).await;
                }
            }
            SiteConcurrency::Concurrent => {
                join_all(
                    batches
                        .iter()
                        .map(|(site_key, batch)| self.run_site_batch(site_key, batch)),
                )
                .await;
            }
        }
    }

    async fn run_site_batch(&self, site_key: &str, batch: &[ApplicationRecord]) {
        let site = match self.registry.get(site_key) {
            Ok(site) => site,
            Err(e) => {
                // Applications referencing an unregistered site cannot be
                // checked; surfaced loudly rather than silently dropped.
                tracing::error!(site = site_key, "cannot run batch: {}", e);
                return;
            }
        };

        let has_pool = match self.shared.pools.get(site_key) {
            Some(pool) => !pool.lock().await.is_empty(),
            None => false,
        };
        if !has_pool {
            tracing::warn!(site = site_key, "no browser leases for site, skipping batch");
            return;
        }

        tracing::debug!(site = site_key, applications = batch.len(), "running batch");

        for (i, application) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.inter_application_delay).await;
            }
            self.process_application(site, application).await;
        }
    }

    /// One application check: acquire a lease, run the driver, release the
    /// lease, count the attempt, and record the outcome. Every failure ends
    /// here; none propagates past this call.
    async fn process_application(&self, site: &SiteConfig, application: &ApplicationRecord) {
        let Some(pool) = self.shared.pools.get(&site.key) else {
            return;
        };

        let Some((lease_index, handle)) = pool.lock().await.acquire() else {
            tracing::warn!(
                site = %site.key,
                application = %application.id,
                "every lease is in use, skipping application this tick"
            );
            return;
        };

        let result = self.checker.check(site, application, &handle).await;

        {
            let mut pool = pool.lock().await;
            if result.as_ref().is_err_and(CheckError::is_throttled) {
                pool.mark_rate_limited(lease_index, self.config.throttle.cooldown());
            }
            pool.release(lease_index);
        }

        // Exactly once per processed application per tick, whatever happened.
        if let Err(e) = self.store.increment_attempts(&application.id).await {
            tracing::warn!(application = %application.id, "attempt counter update failed: {}", e);
        }

        self.bump_stats(&site.key, |s| s.checks += 1);
        self.touch_activity();

        match result {
            Ok(CheckOutcome::NoSlots) => {
                self.log(site, application, "check", "no slots available")
                    .await;
            }
            Ok(CheckOutcome::SlotsFound { booked }) => {
                if let Err(e) = self.store.increment_slots_found(&application.id).await {
                    tracing::warn!(application = %application.id, "slot counter update failed: {}", e);
                }
                self.bump_stats(&site.key, |s| s.slots_found += 1);
                self.notifier
                    .notify(NotifyEvent::SlotsFound, site, application)
                    .await;

                match booked {
                    Some(true) => {
                        self.bump_stats(&site.key, |s| s.bookings += 1);
                        if let Err(e) = self
                            .store
                            .mark_completed(&application.id, "appointment booked")
                            .await
                        {
                            tracing::warn!(application = %application.id, "completion update failed: {}", e);
                        }
                        self.notifier
                            .notify(NotifyEvent::BookingSuccess, site, application)
                            .await;
                    }
                    Some(false) => {
                        self.log(
                            site,
                            application,
                            "booking",
                            "booking submitted but not confirmed",
                        )
                        .await;
                    }
                    None => {}
                }
            }
            Err(CheckError::Throttled) => {
                tracing::warn!(site = %site.key, "throttling detected, lease cooling down");
                self.log(
                    site,
                    application,
                    "rate_limited",
                    "site throttling detected, lease placed in cooldown",
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(
                    site = %site.key,
                    application = %application.id,
                    "check failed: {}", e
                );
                self.log(site, application, "error", &format!("check failed: {}", e))
                    .await;
            }
        }
    }

    async fn log(
        &self,
        site: &SiteConfig,
        application: &ApplicationRecord,
        action: &str,
        details: &str,
    ) {
        if let Err(e) = self
            .store
            .log_activity(Some(&application.id), &site.key, action, details)
            .await
        {
            tracing::debug!("activity log write failed: {}", e);
        }
    }

    fn bump_stats(&self, site_key: &str, update: impl FnOnce(&mut SiteStats)) {
        let mut stats = self.shared.stats.lock().expect("stats poisoned");
        update(stats.entry(site_key.to_string()).or_default());
    }

    fn touch_activity(&self) {
        *self.shared.last_activity.lock().expect("activity poisoned") = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwatch_core::application::{ApplicationStatus, Credentials};

    fn app(id: &str, site: &str) -> ApplicationRecord {
        ApplicationRecord {
            id: id.to_string(),
            site_key: site.to_string(),
            applicant_name: "Test".to_string(),
            credentials: Credentials {
                email: "t@example.com".to_string(),
                password: "pw".to_string(),
            },
            visa_type: None,
            center: None,
            booking_fields: HashMap::new(),
            auto_book: false,
            status: ApplicationStatus::Active,
            attempts: 0,
            slots_found: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_partition_preserves_site_and_store_order() {
        let batches = partition_by_site(vec![
            app("1", "b"),
            app("2", "a"),
            app("3", "b"),
            app("4", "a"),
        ]);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, "b");
        assert_eq!(
            batches[0].1.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
        assert_eq!(batches[1].0, "a");
        assert_eq!(
            batches[1].1.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["2", "4"]
        );
    }

    #[test]
    fn test_partition_empty_input() {
        assert!(partition_by_site(vec![]).is_empty());
    }
}
