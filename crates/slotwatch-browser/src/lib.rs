mod error;
mod launch;
mod pool;
mod session;

pub use error::{Error, Result};
pub use launch::BrowserHandle;
pub use pool::{Lease, LeasePool, LeaseState};
pub use session::CheckSession;
