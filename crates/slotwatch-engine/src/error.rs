use thiserror::Error;

/// Lifecycle failures. Per-application failures never appear here; they are
/// contained within their batch iteration and only reach the activity log.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,

    #[error("no active applications to monitor")]
    NoActiveApplications,

    #[error("no browser leases could be created for any site")]
    NoLeases,

    #[error(transparent)]
    Core(#[from] slotwatch_core::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
