use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown site key: {0}")]
    UnknownSite(String),

    #[error("Invalid site configuration for '{key}': {reason}")]
    InvalidSite { key: String, reason: String },

    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Invalid detection pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;
