use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a tracked application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Active,
    Completed,
    Failed,
}

/// Portal login credentials for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// One tracked appointment application.
///
/// Records are owned by the persistence collaborator; the engine only reads
/// them, increments counters, and transitions status through
/// [`crate::store::ApplicationStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub site_key: String,
    pub applicant_name: String,
    pub credentials: Credentials,
    /// Preferred visa type, matched against the portal's dropdown when one
    /// is configured.
    #[serde(default)]
    pub visa_type: Option<String>,
    /// Preferred appointment center.
    #[serde(default)]
    pub center: Option<String>,
    /// Field name to value mapping filled into the booking form.
    #[serde(default)]
    pub booking_fields: HashMap<String, String>,
    /// Submit a booking automatically when a slot is found.
    #[serde(default)]
    pub auto_book: bool,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub attempts: u64,
    #[serde(default)]
    pub slots_found: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn is_active(&self) -> bool {
        self.status == ApplicationStatus::Active
    }
}

/// One structured activity-log entry emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub application_id: Option<String>,
    pub site_key: String,
    pub action: String,
    pub details: String,
}
