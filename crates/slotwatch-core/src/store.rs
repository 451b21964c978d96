use crate::application::{ActivityEntry, ApplicationRecord, ApplicationStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

/// Persistence collaborator for application records and activity logs.
///
/// The engine never creates or deletes records; it reads the active set,
/// increments counters, and transitions status. Counter mutations are atomic
/// inside the store so the engine never does a read-modify-write on shared
/// state.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Fetch active applications, optionally restricted to one site.
    ///
    /// The returned order is the store's ordering contract; the engine
    /// processes applications in exactly this order.
    async fn active_applications(&self, site_filter: Option<&str>)
        -> Result<Vec<ApplicationRecord>>;

    async fn increment_attempts(&self, id: &str) -> Result<()>;

    async fn increment_slots_found(&self, id: &str) -> Result<()>;

    async fn mark_completed(&self, id: &str, result: &str) -> Result<()>;

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()>;

    async fn log_activity(
        &self,
        application_id: Option<&str>,
        site_key: &str,
        action: &str,
        details: &str,
    ) -> Result<()>;
}

/// In-process store used by the demo flow and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ApplicationRecord>>,
    activity: Mutex<Vec<ActivityEntry>>,
}

impl MemoryStore {
    pub fn new(records: Vec<ApplicationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            activity: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<ApplicationRecord> {
        self.records.lock().expect("store poisoned").clone()
    }

    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.activity.lock().expect("store poisoned").clone()
    }

    fn with_record<F>(&self, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ApplicationRecord),
    {
        let mut records = self.records.lock().expect("store poisoned");
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::ApplicationNotFound(id.to_string()))?;
        mutate(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn active_applications(
        &self,
        site_filter: Option<&str>,
    ) -> Result<Vec<ApplicationRecord>> {
        let records = self.records.lock().expect("store poisoned");
        Ok(records
            .iter()
            .filter(|r| r.is_active())
            .filter(|r| site_filter.is_none_or(|site| r.site_key == site))
            .cloned()
            .collect())
    }

    async fn increment_attempts(&self, id: &str) -> Result<()> {
        self.with_record(id, |r| r.attempts += 1)
    }

    async fn increment_slots_found(&self, id: &str) -> Result<()> {
        self.with_record(id, |r| r.slots_found += 1)
    }

    async fn mark_completed(&self, id: &str, result: &str) -> Result<()> {
        tracing::info!(application = id, "application completed: {}", result);
        self.with_record(id, |r| r.status = ApplicationStatus::Completed)
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        tracing::warn!(application = id, "application failed: {}", reason);
        self.with_record(id, |r| r.status = ApplicationStatus::Failed)
    }

    async fn log_activity(
        &self,
        application_id: Option<&str>,
        site_key: &str,
        action: &str,
        details: &str,
    ) -> Result<()> {
        let mut activity = self.activity.lock().expect("store poisoned");
        activity.push(ActivityEntry {
            at: Utc::now(),
            application_id: application_id.map(str::to_string),
            site_key: site_key.to_string(),
            action: action.to_string(),
            details: details.to_string(),
        });
        Ok(())
    }
}
