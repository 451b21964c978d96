pub mod checker;
pub mod driver;
pub mod engine;
pub mod error;
pub mod notify;
mod scheduler;
pub mod slots;

pub use checker::{ApplicationChecker, CheckError, CheckOutcome, LeaseFactory};
pub use driver::{BrowserLeaseFactory, SiteDriver};
pub use engine::{BrowserMonitorEngine, MonitorEngine};
pub use error::{EngineError, Result};
