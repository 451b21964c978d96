pub mod check;
pub mod run;
pub mod sites;

use anyhow::{Context, Result};
use slotwatch_core::application::ApplicationRecord;
use std::path::Path;

/// Load tracked applications from a JSON array file.
pub fn load_applications(path: &Path) -> Result<Vec<ApplicationRecord>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading applications file {}", path.display()))?;
    let records: Vec<ApplicationRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing applications file {}", path.display()))?;
    Ok(records)
}
