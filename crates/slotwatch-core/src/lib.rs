pub mod application;
pub mod config;
pub mod error;
pub mod site;
pub mod stats;
pub mod store;
pub mod throttle;

pub use error::{Error, Result};
