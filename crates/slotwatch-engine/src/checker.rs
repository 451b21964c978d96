use async_trait::async_trait;
use slotwatch_core::application::ApplicationRecord;
use slotwatch_core::site::SiteConfig;
use thiserror::Error;

/// Result of one completed application check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoSlots,
    /// Slots were detected. `booked` is `None` when auto-booking is off,
    /// otherwise whether the portal confirmed the booking. An unconfirmed
    /// booking is a value here, never an error.
    SlotsFound { booked: Option<bool> },
}

/// Why a check did not complete.
#[derive(Error, Debug)]
pub enum CheckError {
    /// The site signalled rate limiting. Converted into a lease cooldown by
    /// the scheduler; never surfaced as an application failure.
    #[error("site is rate limiting this session")]
    Throttled,

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    Selector(String),

    #[error("browser failure: {0}")]
    Browser(String),
}

impl CheckError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, CheckError::Throttled)
    }
}

impl From<slotwatch_browser::Error> for CheckError {
    fn from(err: slotwatch_browser::Error) -> Self {
        match err {
            slotwatch_browser::Error::Timeout { what, after } => {
                CheckError::Navigation(format!("timed out after {:?} while {}", after, what))
            }
            other => CheckError::Browser(other.to_string()),
        }
    }
}

/// Runs the login → slot-check → optional booking flow for one application
/// against one leased browser handle.
///
/// Generic over the handle type so the scheduler can be exercised with
/// scripted outcomes instead of live browsers.
#[async_trait]
pub trait ApplicationChecker<B>: Send + Sync {
    async fn check(
        &self,
        site: &SiteConfig,
        application: &ApplicationRecord,
        handle: &B,
    ) -> std::result::Result<CheckOutcome, CheckError>;
}

/// Creates and tears down the browser handles held by a site's lease pool.
#[async_trait]
pub trait LeaseFactory<B>: Send + Sync {
    async fn create(&self, site: &SiteConfig) -> slotwatch_browser::Result<B>;

    async fn close(&self, handle: B);
}
