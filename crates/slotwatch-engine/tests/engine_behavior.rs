//! End-to-end engine behavior against an in-memory store, a unit-handle
//! lease factory, and scripted check outcomes.

use async_trait::async_trait;
use chrono::Utc;
use slotwatch_core::application::{ApplicationRecord, ApplicationStatus, Credentials};
use slotwatch_core::config::{EngineConfig, RunProfile, SiteConcurrency, StopBehavior};
use slotwatch_core::site::{SelectorSet, SiteConfig, SiteRegistry};
use slotwatch_core::store::{ApplicationStore, MemoryStore};
use slotwatch_engine::{
    ApplicationChecker, CheckError, CheckOutcome, EngineError, LeaseFactory, MonitorEngine,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Script {
    NoSlots,
    Slots { booked: Option<bool> },
    Throttle,
    Fail,
}

/// Checker that replays a per-application script, defaulting to NoSlots.
#[derive(Default)]
struct ScriptedChecker {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
}

impl ScriptedChecker {
    fn script(self, id: &str, steps: &[Script]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.iter().copied().collect());
        self
    }
}

#[async_trait]
impl ApplicationChecker<()> for ScriptedChecker {
    async fn check(
        &self,
        _site: &SiteConfig,
        application: &ApplicationRecord,
        _handle: &(),
    ) -> Result<CheckOutcome, CheckError> {
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&application.id)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Script::NoSlots);

        match step {
            Script::NoSlots => Ok(CheckOutcome::NoSlots),
            Script::Slots { booked } => Ok(CheckOutcome::SlotsFound { booked }),
            Script::Throttle => Err(CheckError::Throttled),
            Script::Fail => Err(CheckError::Browser("scripted failure".to_string())),
        }
    }
}

/// Lease factory producing unit handles, optionally failing every launch.
#[derive(Default)]
struct UnitFactory {
    created: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl LeaseFactory<()> for UnitFactory {
    async fn create(&self, _site: &SiteConfig) -> slotwatch_browser::Result<()> {
        if self.fail {
            return Err(slotwatch_browser::Error::Launch(
                "scripted launch failure".to_string(),
            ));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _handle: ()) {}
}

fn site(key: &str) -> SiteConfig {
    SiteConfig {
        key: key.to_string(),
        name: format!("Portal {}", key),
        base_url: "https://portal.example.com".to_string(),
        login_url: "https://portal.example.com/login".to_string(),
        appointment_url: "https://portal.example.com/slots".to_string(),
        selectors: SelectorSet {
            email_field: "#email".to_string(),
            password_field: "#password".to_string(),
            login_submit: "#submit".to_string(),
            slot_indicator: ".slot".to_string(),
            booking_control: "#book".to_string(),
            visa_type_dropdown: None,
            center_dropdown: None,
            challenge_indicator: None,
            confirmation_indicator: None,
        },
    }
}

fn application(id: &str, site_key: &str, auto_book: bool) -> ApplicationRecord {
    ApplicationRecord {
        id: id.to_string(),
        site_key: site_key.to_string(),
        applicant_name: format!("Applicant {}", id),
        credentials: Credentials {
            email: format!("{}@example.com", id),
            password: "secret".to_string(),
        },
        visa_type: None,
        center: None,
        booking_fields: HashMap::new(),
        auto_book,
        status: ApplicationStatus::Active,
        attempts: 0,
        slots_found: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// One immediate tick, then effectively never again.
fn config(pool_size: usize) -> EngineConfig {
    let mut config = EngineConfig::for_profile(RunProfile::Headless);
    config.tick_interval = Duration::from_secs(3600);
    config.pool_size = pool_size;
    config.inter_application_delay = Duration::ZERO;
    config.inter_site_delay = Duration::ZERO;
    config
}

fn engine(
    config: EngineConfig,
    sites: Vec<SiteConfig>,
    store: Arc<MemoryStore>,
    checker: ScriptedChecker,
    factory: UnitFactory,
) -> MonitorEngine<()> {
    let registry = SiteRegistry::from_configs(sites).unwrap();
    MonitorEngine::new(
        config,
        registry,
        store,
        Arc::new(checker),
        Arc::new(factory),
    )
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_start_fails_with_no_active_applications() {
    let store = Arc::new(MemoryStore::default());
    let factory = UnitFactory::default();
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store,
        ScriptedChecker::default(),
        factory,
    );

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::NoActiveApplications));
    assert!(!engine.is_running().await);
    // No leases were created and no sites are active.
    assert!(engine.active_sites().await.is_empty());
}

#[tokio::test]
async fn test_start_fails_when_every_lease_launch_fails() {
    let store = Arc::new(MemoryStore::new(vec![application("a1", "portal_a", false)]));
    let factory = UnitFactory {
        created: AtomicUsize::new(0),
        fail: true,
    };
    let engine = engine(
        config(2),
        vec![site("portal_a")],
        store,
        ScriptedChecker::default(),
        factory,
    );

    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::NoLeases));
    assert!(!engine.is_running().await);
}

#[tokio::test]
async fn test_start_fails_for_unregistered_site() {
    let store = Arc::new(MemoryStore::new(vec![application("a1", "portal_x", false)]));
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store,
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    let err = engine.start().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Core(slotwatch_core::Error::UnknownSite(_))
    ));
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let store = Arc::new(MemoryStore::new(vec![application("a1", "portal_a", false)]));
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store,
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let err = engine.start().await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyRunning));

    engine.stop().await;
}

#[tokio::test]
async fn test_stop_twice_is_a_no_op() {
    let store = Arc::new(MemoryStore::new(vec![application("a1", "portal_a", false)]));
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store,
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    // Stopping a never-started engine is also fine.
    engine.stop().await;

    engine.start().await.unwrap();
    engine.stop().await;
    engine.stop().await;
    assert!(!engine.is_running().await);
}

#[tokio::test]
async fn test_failed_check_does_not_abort_batch() {
    let store = Arc::new(MemoryStore::new(vec![
        application("a1", "portal_a", false),
        application("a2", "portal_a", false),
    ]));
    let checker = ScriptedChecker::default().script("a1", &[Script::Fail]);
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store.clone(),
        checker,
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    engine.stop().await;

    // Both applications got exactly one attempt; the failure was contained
    // and logged.
    let records = store.records();
    assert!(records.iter().all(|r| r.attempts == 1));
    assert!(records.iter().all(|r| r.status == ApplicationStatus::Active));

    let activity = store.activity();
    assert!(activity
        .iter()
        .any(|e| e.action == "error" && e.application_id.as_deref() == Some("a1")));
    assert!(activity
        .iter()
        .any(|e| e.action == "check" && e.application_id.as_deref() == Some("a2")));
}

#[tokio::test]
async fn test_throttled_lease_is_degraded_within_same_tick() {
    // Pool size 1, two applications: app1 throttles the only lease, app2
    // still gets it (degraded) in the same tick.
    let store = Arc::new(MemoryStore::new(vec![
        application("a1", "portal_a", false),
        application("a2", "portal_a", false),
    ]));
    let checker = ScriptedChecker::default().script("a1", &[Script::Throttle]);
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store.clone(),
        checker,
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    engine.stop().await;

    let records = store.records();
    assert!(records.iter().all(|r| r.attempts == 1));
    // Throttling never fails the application.
    assert!(records.iter().all(|r| r.status == ApplicationStatus::Active));

    let activity = store.activity();
    assert!(activity
        .iter()
        .any(|e| e.action == "rate_limited" && e.application_id.as_deref() == Some("a1")));
    assert!(activity
        .iter()
        .any(|e| e.action == "check" && e.application_id.as_deref() == Some("a2")));

    let stats = engine.stats().await;
    assert_eq!(stats.total.checks, 2);
    assert_eq!(stats.total.slots_found, 0);
}

#[tokio::test]
async fn test_slots_found_and_booking_update_counters_and_status() {
    let store = Arc::new(MemoryStore::new(vec![
        application("a1", "portal_a", true),
        application("a2", "portal_a", false),
    ]));
    let checker = ScriptedChecker::default()
        .script("a1", &[Script::Slots { booked: Some(true) }])
        .script("a2", &[Script::Slots { booked: None }]);
    let engine = engine(
        config(1),
        vec![site("portal_a")],
        store.clone(),
        checker,
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    engine.stop().await;

    let records = store.records();
    let a1 = records.iter().find(|r| r.id == "a1").unwrap();
    let a2 = records.iter().find(|r| r.id == "a2").unwrap();

    assert_eq!(a1.slots_found, 1);
    assert_eq!(a1.status, ApplicationStatus::Completed);
    assert_eq!(a2.slots_found, 1);
    assert_eq!(a2.status, ApplicationStatus::Active);

    let activity = store.activity();
    assert_eq!(
        activity.iter().filter(|e| e.action == "slots_found").count(),
        2
    );
    assert_eq!(
        activity
            .iter()
            .filter(|e| e.action == "booking_success")
            .count(),
        1
    );

    let stats = engine.stats().await;
    assert_eq!(stats.total.checks, 2);
    assert_eq!(stats.total.slots_found, 2);
    assert_eq!(stats.total.bookings, 1);
}

#[tokio::test]
async fn test_concurrent_sites_both_complete_their_batches() {
    let store = Arc::new(MemoryStore::new(vec![
        application("a1", "portal_a", false),
        application("a2", "portal_a", false),
        application("b1", "portal_b", false),
    ]));
    let mut config = config(1);
    config.site_concurrency = SiteConcurrency::Concurrent;
    let engine = engine(
        config,
        vec![site("portal_a"), site("portal_b")],
        store.clone(),
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    engine.stop().await;

    // Every application across both sites got exactly one attempt.
    assert!(store.records().iter().all(|r| r.attempts == 1));

    let stats = engine.stats().await;
    assert_eq!(stats.per_site.get("portal_a").unwrap().checks, 2);
    assert_eq!(stats.per_site.get("portal_b").unwrap().checks, 1);
    assert_eq!(stats.total.checks, 3);
}

#[tokio::test]
async fn test_interrupt_stop_still_closes_leases() {
    let store = Arc::new(MemoryStore::new(vec![application("a1", "portal_a", false)]));
    let mut config = config(1);
    config.stop_behavior = StopBehavior::Interrupt;
    let engine = engine(
        config,
        vec![site("portal_a")],
        store.clone(),
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    engine.start().await.unwrap();
    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    engine.stop().await;

    assert!(!engine.is_running().await);
    // The aborted tick task does not leak leases; every pool was drained.
    assert!(engine.active_sites().await.is_empty());
    // Counters from before the interrupt survive.
    assert_eq!(engine.stats().await.total.checks, 1);
}

#[tokio::test]
async fn test_active_sites_and_last_activity() {
    let store = Arc::new(MemoryStore::new(vec![
        application("a1", "portal_a", false),
        application("b1", "portal_b", false),
    ]));
    let engine = engine(
        config(1),
        vec![site("portal_a"), site("portal_b")],
        store.clone(),
        ScriptedChecker::default(),
        UnitFactory::default(),
    );

    assert!(engine.last_activity().await.is_none());

    engine.start().await.unwrap();
    assert_eq!(engine.active_sites().await, vec!["portal_a", "portal_b"]);

    let probe = store.clone();
    wait_for(move || probe.records().iter().all(|r| r.attempts == 1)).await;
    assert!(engine.last_activity().await.is_some());

    engine.stop().await;
    // Leases are closed on stop, so no site holds a pool any more.
    assert!(engine.active_sites().await.is_empty());
    // Stats from the finished run remain readable.
    assert_eq!(engine.stats().await.total.checks, 2);
}
